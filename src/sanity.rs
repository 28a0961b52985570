//! Pre-flight sanity checks for runtime environment
//!
//! This module verifies the host before any stage runs:
//! - Required base binaries are present
//! - Running with root privileges (EUID 0)
//!
//! Binaries that only exist after the package stage (`sudo`, `visudo`,
//! `ufw`, `sshd`) are checked by that stage instead.

use tracing::{debug, warn};

use crate::error::{Result, ServerPrepError};
use crate::tool_runner::{CommandRunner, run_tool_safe};
use crate::tools::system::WhichArgs;

/// Result of environment verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }

    /// Turn a failed check into a precondition error naming every problem.
    pub fn ensure_ok(&self) -> Result<()> {
        if self.is_ok() {
            return Ok(());
        }

        let mut problems = Vec::new();
        if !self.is_root {
            problems.push("must be run as root (try: sudo serverprep ...)".to_string());
        }
        if !self.missing_binaries.is_empty() {
            let packages: Vec<&str> = self
                .missing_binaries
                .iter()
                .map(|b| get_package_for_binary(b))
                .collect();
            problems.push(format!(
                "missing required binaries: {} (install: apt-get install {})",
                self.missing_binaries.join(", "),
                packages.join(" ")
            ));
        }

        Err(ServerPrepError::precondition(problems.join("; ")))
    }
}

/// Binaries every Debian base system should already have.
pub const REQUIRED_BINARIES: &[&str] = &[
    "apt-get",   // Package management
    "getent",    // Account lookups
    "useradd",   // Account creation
    "usermod",   // Group membership
    "id",        // Group listing
    "chown",     // Ownership of ~/.ssh
    "systemctl", // Daemon restart
];

/// Check if a binary is available in PATH
pub fn binary_exists(runner: &dyn CommandRunner, name: &str) -> bool {
    run_tool_safe(
        runner,
        &WhichArgs {
            binary: name.to_string(),
        },
    )
    .map(|output| output.success)
    .unwrap_or(false)
}

/// Check if running as root (EUID 0)
pub fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Skip root check (for development/testing)
/// Set SERVERPREP_SKIP_ROOT_CHECK=1 to skip
pub fn should_skip_root_check() -> bool {
    std::env::var("SERVERPREP_SKIP_ROOT_CHECK")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Perform all sanity checks and return the result
pub fn verify_environment(runner: &dyn CommandRunner) -> SanityCheckResult {
    debug!("Running pre-flight sanity checks...");

    let missing_binaries = REQUIRED_BINARIES
        .iter()
        .filter(|binary| !binary_exists(runner, binary))
        .map(|binary| (*binary).to_string())
        .collect();

    let mut is_root = is_running_as_root();
    if !is_root && should_skip_root_check() {
        warn!("Root check skipped (SERVERPREP_SKIP_ROOT_CHECK=1)");
        is_root = true;
    }

    SanityCheckResult {
        missing_binaries,
        is_root,
    }
}

/// Map binary names to their Debian package names
pub fn get_package_for_binary(binary: &str) -> &'static str {
    match binary {
        "apt-get" => "apt",
        "getent" => "libc-bin",
        "useradd" | "usermod" => "passwd",
        "id" | "chown" => "coreutils",
        "systemctl" => "systemd",
        "sudo" | "visudo" => "sudo",
        "ufw" => "ufw",
        "sshd" => "openssh-server",
        _ => "unknown",
    }
}
