//! Type-safe arguments for account and privilege tools.
//!
//! - `GetentPasswdArgs` / `PasswdEntry` for identity lookups
//! - `UserAddArgs` for `useradd`
//! - `SudoListArgs` and `VisudoCheckArgs` for the sudo policy store
//! - `IdGroupsArgs` and `UserModAppendGroupArgs` for group membership
//! - `ChownArgs` for `chown`

use std::path::PathBuf;

use crate::tool_traits::ToolArgs;

/// Exit status of `getent` when the key does not exist in the database.
pub const GETENT_NOT_FOUND: i32 = 2;

// ============================================================================
// getent passwd
// ============================================================================

/// `getent passwd <username>` (read-only)
#[derive(Debug, Clone)]
pub struct GetentPasswdArgs {
    pub username: String,
}

impl ToolArgs for GetentPasswdArgs {
    fn program(&self) -> &'static str {
        "getent"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["passwd".to_string(), self.username.clone()]
    }

    fn is_destructive(&self) -> bool {
        false
    }
}

/// One line of the passwd database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
}

impl PasswdEntry {
    /// Parse `name:passwd:uid:gid:gecos:home:shell`.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split(':').collect();
        if fields.len() != 7 || fields[0].is_empty() {
            return None;
        }
        Some(Self {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: PathBuf::from(fields[5]),
            shell: fields[6].to_string(),
        })
    }
}

// ============================================================================
// useradd
// ============================================================================

/// `useradd -m -s <shell> <username>`
#[derive(Debug, Clone)]
pub struct UserAddArgs {
    pub username: String,
    pub shell: String,
}

impl ToolArgs for UserAddArgs {
    fn program(&self) -> &'static str {
        "useradd"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            "-s".to_string(),
            self.shell.clone(),
            self.username.clone(),
        ]
    }
}

// ============================================================================
// sudo -l
// ============================================================================

/// `sudo -l -U <username>` (read-only)
#[derive(Debug, Clone)]
pub struct SudoListArgs {
    pub username: String,
}

impl ToolArgs for SudoListArgs {
    fn program(&self) -> &'static str {
        "sudo"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-l".to_string(), "-U".to_string(), self.username.clone()]
    }

    fn is_destructive(&self) -> bool {
        false
    }
}

// ============================================================================
// visudo -c
// ============================================================================

/// `visudo -c -f <path>`
///
/// Marked destructive: it checks a drop-in that only exists once the write
/// has actually happened, so dry-run skips it along with the write.
#[derive(Debug, Clone)]
pub struct VisudoCheckArgs {
    pub path: PathBuf,
}

impl ToolArgs for VisudoCheckArgs {
    fn program(&self) -> &'static str {
        "visudo"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-c".to_string(),
            "-f".to_string(),
            self.path.display().to_string(),
        ]
    }
}

// ============================================================================
// id -nG
// ============================================================================

/// `id -nG <username>` (read-only)
#[derive(Debug, Clone)]
pub struct IdGroupsArgs {
    pub username: String,
}

impl ToolArgs for IdGroupsArgs {
    fn program(&self) -> &'static str {
        "id"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-nG".to_string(), self.username.clone()]
    }

    fn is_destructive(&self) -> bool {
        false
    }
}

// ============================================================================
// usermod -aG
// ============================================================================

/// `usermod -aG <group> <username>`
#[derive(Debug, Clone)]
pub struct UserModAppendGroupArgs {
    pub username: String,
    pub group: String,
}

impl ToolArgs for UserModAppendGroupArgs {
    fn program(&self) -> &'static str {
        "usermod"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-aG".to_string(),
            self.group.clone(),
            self.username.clone(),
        ]
    }
}

// ============================================================================
// chown
// ============================================================================

/// `chown [-R] <owner>: <path>`
///
/// The trailing colon assigns the owner's login group.
#[derive(Debug, Clone)]
pub struct ChownArgs {
    pub owner: String,
    pub path: PathBuf,
    pub recursive: bool,
}

impl ToolArgs for ChownArgs {
    fn program(&self) -> &'static str {
        "chown"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(3);
        if self.recursive {
            args.push("-R".to_string());
        }
        args.push(format!("{}:", self.owner));
        args.push(self.path.display().to_string());
        args
    }
}
