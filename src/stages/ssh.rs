//! SSH hardening stage.
//!
//! Backs up `sshd_config`, applies the hardening policy, has `sshd` validate
//! the result and restarts the daemon. The port reported back is read from
//! the rendered file, so the firewall opens exactly what sshd will listen on.
//!
//! Before the restart, `sshd -T` is asked for the effective settings; files
//! pulled in by `Include` and read first can still override the main file,
//! and such an override fails the stage. In dry-run the rendered file goes to
//! a scratch copy next to the real one, so both checks see what would be
//! written.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::engine::sshd_config::{
    DirectiveChange, HardeningDirective, SshdConfig, effective_overrides, hardening_policy,
};
use crate::error::{Result, ServerPrepError};
use crate::host_fs::HostFs;
use crate::params::Settings;
use crate::tool_runner::{CommandRunner, ToolOutput, run_tool_checked, run_tool_safe};
use crate::tool_traits::ToolArgs;
use crate::tools::system::{SshdEffectiveArgs, SshdTestArgs, SystemctlArgs};

/// Backup name format, appended to the original file name.
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Where and how to harden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardenPlan {
    pub config_path: PathBuf,
    pub port: u16,
    /// systemd unit of the daemon (`ssh` on Debian).
    pub service: String,
}

impl HardenPlan {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            config_path: settings.options.sshd_config.clone(),
            port: settings.params.ssh_port,
            service: settings.options.ssh_service.clone(),
        }
    }
}

/// Outcome of a hardening pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardenReport {
    /// Port written into the validated configuration.
    pub port: u16,
    pub backup_path: PathBuf,
    pub changes: Vec<DirectiveChange>,
}

impl HardenReport {
    /// Directives whose line was actually rewritten, uncommented or added.
    pub fn changed(&self) -> usize {
        self.changes.iter().filter(|c| c.is_change()).count()
    }
}

/// `<config>.bak.<YYYYMMDD-HHMMSS>`, with `-N` appended if that name is taken.
pub fn backup_path_for(fs: &dyn HostFs, config_path: &Path, now: &DateTime<Local>) -> PathBuf {
    let base = format!(
        "{}.bak.{}",
        config_path.display(),
        now.format(BACKUP_TIMESTAMP_FORMAT)
    );
    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while fs.exists(&candidate) {
        candidate = PathBuf::from(format!("{base}-{n}"));
        n += 1;
    }
    candidate
}

/// Harden the daemon configuration and restart the daemon.
pub fn harden(
    runner: &dyn CommandRunner,
    fs: &dyn HostFs,
    plan: &HardenPlan,
    now: DateTime<Local>,
) -> Result<HardenReport> {
    let path = plan.config_path.as_path();
    let original = fs.read_to_string(path)?;
    let mode = fs.mode(path)?;

    let backup_path = backup_path_for(fs, path, &now);
    info!("Backing up {} to {}", path.display(), backup_path.display());
    fs.copy(path, &backup_path)?;

    let mut config = SshdConfig::parse(&original);
    for include in config.includes() {
        warn!(
            "{} includes {include}; settings there that are read first can override these and are checked with sshd -T",
            path.display()
        );
    }

    let changes = config.apply(&hardening_policy(plan.port));
    for change in &changes {
        if change.is_change() {
            info!("  {change}");
        } else {
            debug!("  {change}");
        }
    }

    let rendered = config.render();
    let port = written_port(&rendered, path)?;

    let scratch = if rendered == original {
        info!("{} already hardened", path.display());
        None
    } else {
        fs.write_atomic(path, &rendered, mode)?;
        if fs.is_dry_run() {
            Some(fs.write_scratch(path, &rendered, mode)?)
        } else {
            None
        }
    };
    let checked = scratch.as_ref().map_or(path, |s| s.path());

    validate_config(runner, checked)?;
    verify_effective(runner, checked, port)?;
    drop(scratch);
    restart_daemon(runner, &plan.service)?;

    Ok(HardenReport {
        port,
        backup_path,
        changes,
    })
}

/// The `Port` value sshd will actually use from `rendered`.
fn written_port(rendered: &str, path: &Path) -> Result<u16> {
    let keyword = HardeningDirective::Port.keyword();
    SshdConfig::parse(rendered)
        .value_of(keyword)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ServerPrepError::InvalidSshConfig {
            path: path.display().to_string(),
            detail: "no usable Port directive after hardening".to_string(),
        })
}

/// Run an `sshd` check. `None` when sshd is not installed yet in dry-run.
fn run_sshd(runner: &dyn CommandRunner, args: &dyn ToolArgs) -> Result<Option<ToolOutput>> {
    match run_tool_safe(runner, args) {
        Ok(output) => Ok(Some(output)),
        Err(ServerPrepError::Spawn { .. }) if runner.is_dry_run() => {
            warn!("[dry-run] sshd not installed yet, skipping `{}`", args.command_line());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// `sshd -t -f <path>`; a rejection is fatal and nothing is restarted.
fn validate_config(runner: &dyn CommandRunner, path: &Path) -> Result<()> {
    let args = SshdTestArgs {
        config: path.to_path_buf(),
    };
    let Some(output) = run_sshd(runner, &args)? else {
        return Ok(());
    };

    if !output.success {
        return Err(ServerPrepError::InvalidSshConfig {
            path: path.display().to_string(),
            detail: output.stderr.trim().to_string(),
        });
    }
    info!("sshd accepted {}", path.display());
    Ok(())
}

/// `sshd -T -f <path>`; every hardened keyword sshd reports must carry the
/// hardened value.
fn verify_effective(runner: &dyn CommandRunner, path: &Path, port: u16) -> Result<()> {
    let args = SshdEffectiveArgs {
        config: path.to_path_buf(),
    };
    let Some(output) = run_sshd(runner, &args)? else {
        return Ok(());
    };
    output.ensure_success(&args.command_line())?;

    let overrides = effective_overrides(&output.stdout, &hardening_policy(port));
    if !overrides.is_empty() {
        return Err(ServerPrepError::InvalidSshConfig {
            path: path.display().to_string(),
            detail: format!(
                "overridden by an included file: {}",
                overrides.join(", ")
            ),
        });
    }
    debug!("Effective sshd settings match the hardening policy");
    Ok(())
}

/// Restart the service, and its socket unit when socket activation is on.
fn restart_daemon(runner: &dyn CommandRunner, service: &str) -> Result<()> {
    info!("Restarting {service}");
    run_tool_checked(runner, &SystemctlArgs::restart(service))?;

    let socket = format!("{service}.socket");
    let active = run_tool_safe(runner, &SystemctlArgs::is_active(socket.as_str()))?;
    if active.success {
        info!("{socket} is active, reloading units and restarting it");
        run_tool_checked(runner, &SystemctlArgs::daemon_reload())?;
        run_tool_checked(runner, &SystemctlArgs::restart(socket.as_str()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_fs::LocalFs;
    use crate::tool_runner::{Invocation, MockCommandRunner, ToolOutput};
    use chrono::TimeZone;
    use mockall::Sequence;
    use tempfile::TempDir;

    const CONFIG: &str = "/etc/ssh/sshd_config";

    fn seeded_fs(dir: &TempDir, contents: &str) -> LocalFs {
        let fs = LocalFs::with_root(dir.path(), false);
        fs.create_dir_all(Path::new("/etc/ssh"), 0o755).unwrap();
        fs.write_atomic(Path::new(CONFIG), contents, 0o644).unwrap();
        fs
    }

    fn plan(port: u16) -> HardenPlan {
        HardenPlan {
            config_path: PathBuf::from(CONFIG),
            port,
            service: "ssh".to_string(),
        }
    }

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn is_systemctl(inv: &Invocation, verb: &str) -> bool {
        inv.program == "systemctl" && inv.args.first().map(String::as_str) == Some(verb)
    }

    fn is_sshd(inv: &Invocation, flag: &str) -> bool {
        inv.program == "sshd" && inv.args.first().map(String::as_str) == Some(flag)
    }

    /// `sshd -T` output for a fully hardened daemon.
    fn hardened_dump(port: u16) -> String {
        hardening_policy(port)
            .iter()
            .map(|s| format!("{} {}\n", s.directive.keyword().to_ascii_lowercase(), s.value))
            .collect()
    }

    /// Accept the file and report it as fully hardened.
    fn expect_checks(runner: &mut MockCommandRunner, seq: &mut Sequence, port: u16) {
        runner
            .expect_run()
            .withf(|inv| is_sshd(inv, "-t"))
            .times(1)
            .in_sequence(seq)
            .returning(|_| Ok(ToolOutput::succeeded("")));
        runner
            .expect_run()
            .withf(|inv| is_sshd(inv, "-T"))
            .times(1)
            .in_sequence(seq)
            .returning(move |_| Ok(ToolOutput::succeeded(hardened_dump(port))));
    }

    #[test]
    fn test_backup_path_format_and_collision() {
        let dir = TempDir::new().unwrap();
        let fs = seeded_fs(&dir, "Port 22\n");
        let first = backup_path_for(&fs, Path::new(CONFIG), &fixed_now());
        assert_eq!(
            first,
            PathBuf::from("/etc/ssh/sshd_config.bak.20260314-092653")
        );

        fs.copy(Path::new(CONFIG), &first).unwrap();
        let second = backup_path_for(&fs, Path::new(CONFIG), &fixed_now());
        assert_eq!(
            second,
            PathBuf::from("/etc/ssh/sshd_config.bak.20260314-092653-1")
        );
    }

    #[test]
    fn test_harden_writes_validates_then_restarts() {
        let dir = TempDir::new().unwrap();
        let fs = seeded_fs(&dir, "#Port 22\nPasswordAuthentication yes\nUsePAM yes\n");

        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_checks(&mut runner, &mut seq, 2222);
        runner
            .expect_run()
            .withf(|inv| is_systemctl(inv, "restart") && inv.args[1] == "ssh")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ToolOutput::succeeded("")));
        runner
            .expect_run()
            .withf(|inv| is_systemctl(inv, "is-active"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ToolOutput::failed(3, "")));

        let report = harden(&runner, &fs, &plan(2222), fixed_now()).unwrap();
        assert_eq!(report.port, 2222);
        assert_eq!(report.changed(), 11);

        let written = fs.read_to_string(Path::new(CONFIG)).unwrap();
        assert!(written.starts_with("Port 2222\nPasswordAuthentication no\nUsePAM yes\n"));
        assert_eq!(fs.mode(Path::new(CONFIG)).unwrap(), 0o644);
        assert_eq!(
            fs.read_to_string(&report.backup_path).unwrap(),
            "#Port 22\nPasswordAuthentication yes\nUsePAM yes\n"
        );
    }

    #[test]
    fn test_socket_unit_restarted_when_active() {
        let dir = TempDir::new().unwrap();
        let fs = seeded_fs(&dir, "Port 22\n");

        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        expect_checks(&mut runner, &mut seq, 22);
        for (verb, unit) in [
            ("restart", Some("ssh")),
            ("is-active", None),
            ("daemon-reload", None),
            ("restart", Some("ssh.socket")),
        ] {
            runner
                .expect_run()
                .withf(move |inv| {
                    is_systemctl(inv, verb) && unit.is_none_or(|u| inv.args.last().is_some_and(|a| a == u))
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(ToolOutput::succeeded("")));
        }

        harden(&runner, &fs, &plan(22), fixed_now()).unwrap();
    }

    #[test]
    fn test_rejected_config_is_not_restarted() {
        let dir = TempDir::new().unwrap();
        let fs = seeded_fs(&dir, "Port 22\nBogusKeyword yes\n");

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.program == "sshd")
            .times(1)
            .returning(|_| {
                Ok(ToolOutput::failed(
                    255,
                    "/etc/ssh/sshd_config: line 2: Bad configuration option: BogusKeyword\n",
                ))
            });
        runner
            .expect_run()
            .withf(|inv| inv.program == "systemctl")
            .never();

        let err = harden(&runner, &fs, &plan(2222), fixed_now()).unwrap_err();
        match err {
            ServerPrepError::InvalidSshConfig { detail, .. } => {
                assert!(detail.contains("BogusKeyword"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Left modified for manual recovery.
        assert!(
            fs.read_to_string(Path::new(CONFIG))
                .unwrap()
                .starts_with("Port 2222\n")
        );
    }

    #[test]
    fn test_included_override_fails_before_restart() {
        let dir = TempDir::new().unwrap();
        let fs = seeded_fs(&dir, "Include /etc/ssh/sshd_config.d/*.conf\nPort 22\n");

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| is_sshd(inv, "-t"))
            .times(1)
            .returning(|_| Ok(ToolOutput::succeeded("")));
        runner
            .expect_run()
            .withf(|inv| is_sshd(inv, "-T") && inv.args[2] == CONFIG)
            .times(1)
            .returning(|_| {
                Ok(ToolOutput::succeeded(
                    hardened_dump(2222).replace("passwordauthentication no", "passwordauthentication yes"),
                ))
            });
        runner
            .expect_run()
            .withf(|inv| inv.program == "systemctl")
            .never();

        let err = harden(&runner, &fs, &plan(2222), fixed_now()).unwrap_err();
        match err {
            ServerPrepError::InvalidSshConfig { detail, .. } => {
                assert!(detail.contains("passwordauthentication yes (want no)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_dry_run_checks_a_scratch_copy_of_the_rendered_file() {
        let dir = TempDir::new().unwrap();
        seeded_fs(&dir, "#Port 22\nPasswordAuthentication yes\n");
        let fs = LocalFs::with_root(dir.path(), true);
        let root = dir.path().to_path_buf();

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.program == "sshd")
            .times(2)
            .returning(move |inv| {
                let checked = Path::new(&inv.args[2]);
                assert_ne!(checked, Path::new(CONFIG));
                assert_eq!(checked.parent(), Some(Path::new("/etc/ssh")));
                let seen = std::fs::read_to_string(root.join(checked.strip_prefix("/").unwrap())).unwrap();
                assert!(seen.starts_with("Port 2222\nPasswordAuthentication no\n"));
                if inv.args[0] == "-T" {
                    Ok(ToolOutput::succeeded(hardened_dump(2222)))
                } else {
                    Ok(ToolOutput::succeeded(""))
                }
            });
        runner
            .expect_run()
            .withf(|inv| inv.program == "systemctl")
            .returning(|inv| match inv.args[0].as_str() {
                "is-active" => Ok(ToolOutput::failed(3, "")),
                _ => Ok(ToolOutput::succeeded("")),
            });

        harden(&runner, &fs, &plan(2222), fixed_now()).unwrap();

        assert_eq!(
            fs.read_to_string(Path::new(CONFIG)).unwrap(),
            "#Port 22\nPasswordAuthentication yes\n"
        );
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("etc/ssh"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("sshd_config")]);
    }

    #[test]
    fn test_missing_config_fails_before_any_command() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFs::with_root(dir.path(), false);
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();

        assert!(harden(&runner, &fs, &plan(22), fixed_now()).is_err());
    }

    #[test]
    fn test_written_port_reads_rendered_file() {
        assert_eq!(
            written_port("Port 2222\n", Path::new(CONFIG)).unwrap(),
            2222
        );
        assert!(written_port("# nothing\n", Path::new(CONFIG)).is_err());
    }
}
