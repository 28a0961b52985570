//! Type-safe arguments for system tools.
//!
//! - `WhichArgs` for binary lookups
//! - `SystemctlArgs` for service control
//! - `SshdTestArgs` for the SSH daemon's configuration self-check
//! - `SshdEffectiveArgs` for the settings the daemon would actually run with

use std::path::PathBuf;

use strum::{Display, EnumString};

use crate::tool_traits::ToolArgs;

// ============================================================================
// which
// ============================================================================

/// `which <binary>` (read-only)
#[derive(Debug, Clone)]
pub struct WhichArgs {
    pub binary: String,
}

impl ToolArgs for WhichArgs {
    fn program(&self) -> &'static str {
        "which"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.binary.clone()]
    }

    fn is_destructive(&self) -> bool {
        false
    }
}

// ============================================================================
// systemctl
// ============================================================================

/// Subset of systemctl verbs serverprep uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum SystemctlAction {
    Restart,
    DaemonReload,
    IsActive,
}

/// `systemctl <action> [unit]`
#[derive(Debug, Clone)]
pub struct SystemctlArgs {
    pub action: SystemctlAction,
    pub unit: Option<String>,
}

impl SystemctlArgs {
    pub fn restart(unit: impl Into<String>) -> Self {
        Self {
            action: SystemctlAction::Restart,
            unit: Some(unit.into()),
        }
    }

    pub fn is_active(unit: impl Into<String>) -> Self {
        Self {
            action: SystemctlAction::IsActive,
            unit: Some(unit.into()),
        }
    }

    pub fn daemon_reload() -> Self {
        Self {
            action: SystemctlAction::DaemonReload,
            unit: None,
        }
    }
}

impl ToolArgs for SystemctlArgs {
    fn program(&self) -> &'static str {
        "systemctl"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![self.action.to_string()];
        if self.action == SystemctlAction::IsActive {
            args.push("--quiet".to_string());
        }
        if let Some(ref unit) = self.unit {
            args.push(unit.clone());
        }
        args
    }

    fn is_destructive(&self) -> bool {
        self.action != SystemctlAction::IsActive
    }
}

// ============================================================================
// sshd -t
// ============================================================================

/// `sshd -t -f <config>` (read-only syntax check)
#[derive(Debug, Clone)]
pub struct SshdTestArgs {
    pub config: PathBuf,
}

impl ToolArgs for SshdTestArgs {
    fn program(&self) -> &'static str {
        "sshd"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-t".to_string(),
            "-f".to_string(),
            self.config.display().to_string(),
        ]
    }

    fn is_destructive(&self) -> bool {
        false
    }
}

/// `sshd -T -f <config>`: dump the effective configuration, one lowercase
/// `keyword value` pair per line, after includes are resolved.
#[derive(Debug, Clone)]
pub struct SshdEffectiveArgs {
    pub config: PathBuf,
}

impl ToolArgs for SshdEffectiveArgs {
    fn program(&self) -> &'static str {
        "sshd"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-T".to_string(),
            "-f".to_string(),
            self.config.display().to_string(),
        ]
    }

    fn is_destructive(&self) -> bool {
        false
    }
}
