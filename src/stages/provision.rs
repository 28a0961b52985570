//! User provisioning stage.
//!
//! Converges the admin account: the user exists, has passwordless sudo,
//! belongs to the admin group and trusts exactly one public key. Each part is
//! re-derived from the live system so a second run changes nothing but the
//! key file.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, ServerPrepError};
use crate::host_fs::HostFs;
use crate::params::Settings;
use crate::tool_runner::{CommandRunner, run_tool_checked, run_tool_safe};
use crate::tool_traits::ToolArgs;
use crate::tools::user::{
    ChownArgs, GETENT_NOT_FOUND, GetentPasswdArgs, IdGroupsArgs, PasswdEntry, SudoListArgs,
    UserAddArgs, UserModAppendGroupArgs, VisudoCheckArgs,
};

/// Directory sudo reads drop-in policy files from.
pub const SUDOERS_DIR: &str = "/etc/sudoers.d";

const SUDOERS_MODE: u32 = 0o440;
const SSH_DIR_MODE: u32 = 0o700;
const AUTHORIZED_KEYS_MODE: u32 = 0o600;

/// The account to converge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub username: String,
    pub shell: String,
    pub group: String,
    /// Full `authorized_keys` contents.
    pub authorized_key: String,
}

impl AdminAccount {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            username: settings.params.admin_user.clone(),
            shell: settings.options.admin_shell.clone(),
            group: settings.options.admin_group.clone(),
            authorized_key: settings.params.authorized_key_line(),
        }
    }
}

/// What provisioning found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub home: PathBuf,
    pub created_user: bool,
    pub granted_sudo: bool,
    pub added_to_group: bool,
    pub authorized_keys: PathBuf,
}

/// `/etc/sudoers.d/90-<user>`
pub fn sudoers_drop_in_path(username: &str) -> PathBuf {
    Path::new(SUDOERS_DIR).join(format!("90-{username}"))
}

/// Passwordless sudo rule for `username`.
pub fn sudoers_rule(username: &str) -> String {
    format!("{username} ALL=(ALL) NOPASSWD:ALL\n")
}

/// Look a user up in the passwd database. `Ok(None)` means absent.
pub fn lookup_user(runner: &dyn CommandRunner, username: &str) -> Result<Option<PasswdEntry>> {
    let args = GetentPasswdArgs {
        username: username.to_string(),
    };
    let output = run_tool_safe(runner, &args)?;

    if output.exit_code == Some(GETENT_NOT_FOUND) {
        return Ok(None);
    }
    output.ensure_success(&args.command_line())?;

    let line = output.stdout.lines().next().unwrap_or_default();
    PasswdEntry::parse(line).map(Some).ok_or_else(|| {
        ServerPrepError::command(
            args.command_line(),
            0,
            format!("unexpected passwd entry: {line:?}"),
        )
    })
}

/// Converge the admin account.
pub fn provision_admin(
    runner: &dyn CommandRunner,
    fs: &dyn HostFs,
    account: &AdminAccount,
) -> Result<ProvisionReport> {
    let user = account.username.as_str();

    let (home, created_user) = ensure_user(runner, account)?;
    let granted_sudo = ensure_sudo(runner, fs, user)?;

    let ssh_dir = home.join(".ssh");
    let authorized_keys = ssh_dir.join("authorized_keys");
    info!("Installing public key into {}", authorized_keys.display());
    fs.create_dir_all(&ssh_dir, SSH_DIR_MODE)?;
    fs.write_atomic(&authorized_keys, &account.authorized_key, AUTHORIZED_KEYS_MODE)?;
    run_tool_checked(
        runner,
        &ChownArgs {
            owner: user.to_string(),
            path: ssh_dir,
            recursive: true,
        },
    )?;

    let added_to_group = ensure_group(runner, user, &account.group)?;

    Ok(ProvisionReport {
        home,
        created_user,
        granted_sudo,
        added_to_group,
        authorized_keys,
    })
}

/// Create the user when absent; return its home and whether it was created.
fn ensure_user(runner: &dyn CommandRunner, account: &AdminAccount) -> Result<(PathBuf, bool)> {
    let user = account.username.as_str();

    if let Some(entry) = lookup_user(runner, user)? {
        info!(
            "User {} already exists (uid {}, gid {}), leaving it as is",
            entry.name, entry.uid, entry.gid
        );
        if entry.shell != account.shell {
            debug!("{} keeps its login shell {}", entry.name, entry.shell);
        }
        return Ok((entry.home, false));
    }

    info!("Creating user {user}");
    run_tool_checked(
        runner,
        &UserAddArgs {
            username: user.to_string(),
            shell: account.shell.clone(),
        },
    )?;

    match lookup_user(runner, user)? {
        Some(entry) => Ok((entry.home, true)),
        None if runner.is_dry_run() => Ok((Path::new("/home").join(user), true)),
        None => Err(ServerPrepError::command(
            format!("useradd {user}"),
            0,
            "user still missing from the passwd database after creation",
        )),
    }
}

/// Grant passwordless sudo unless the policy already allows it.
fn ensure_sudo(runner: &dyn CommandRunner, fs: &dyn HostFs, user: &str) -> Result<bool> {
    let listing = run_tool_safe(
        runner,
        &SudoListArgs {
            username: user.to_string(),
        },
    )?;
    if listing.success && grants_unrestricted_nopasswd(&listing.stdout) {
        info!("User {user} already has passwordless sudo");
        return Ok(false);
    }

    let drop_in = sudoers_drop_in_path(user);
    info!("Granting passwordless sudo via {}", drop_in.display());

    let sudoers_dir = Path::new(SUDOERS_DIR);
    if !fs.exists(sudoers_dir) {
        fs.create_dir_all(sudoers_dir, 0o755)?;
    }
    fs.write_atomic(&drop_in, &sudoers_rule(user), SUDOERS_MODE)?;

    let check = VisudoCheckArgs {
        path: drop_in.clone(),
    };
    let output = run_tool_safe(runner, &check)?;
    if !output.success {
        warn!("visudo rejected {}, removing it", drop_in.display());
        fs.remove_file(&drop_in)?;
        output.ensure_success(&check.command_line())?;
    }

    Ok(true)
}

/// Whether a `sudo -l -U` listing holds a `(ALL) NOPASSWD: ALL` entry.
/// Rules limited to some commands or some target users do not count.
fn grants_unrestricted_nopasswd(listing: &str) -> bool {
    listing.lines().any(|line| {
        let Some((runas, spec)) = line
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.split_once(')'))
        else {
            return false;
        };
        let runas: String = runas.split_whitespace().collect();
        if runas != "ALL" && runas != "ALL:ALL" {
            return false;
        }

        let mut nopasswd = false;
        let mut commands = Vec::new();
        for token in spec.split_whitespace() {
            match token.strip_suffix(':') {
                Some("NOPASSWD") if commands.is_empty() => nopasswd = true,
                Some("PASSWD") if commands.is_empty() => nopasswd = false,
                Some(_) if commands.is_empty() => {}
                _ => commands.push(token),
            }
        }
        nopasswd && commands == ["ALL"]
    })
}

/// Append the user to `group` unless already a member.
fn ensure_group(runner: &dyn CommandRunner, user: &str, group: &str) -> Result<bool> {
    let args = IdGroupsArgs {
        username: user.to_string(),
    };
    let output = run_tool_safe(runner, &args)?;
    if output.success {
        if output.stdout.split_whitespace().any(|g| g == group) {
            info!("User {user} is already in group {group}");
            return Ok(false);
        }
    } else if runner.is_dry_run() {
        debug!("id failed for {user}; assuming not yet created");
    } else {
        output.ensure_success(&args.command_line())?;
    }

    info!("Adding {user} to group {group}");
    run_tool_checked(
        runner,
        &UserModAppendGroupArgs {
            username: user.to_string(),
            group: group.to_string(),
        },
    )?;
    Ok(true)
}
