//! Type-safe arguments for `apt-get`.
//!
//! All apt invocations run non-interactively: no debconf prompts, no
//! needrestart dialogs, and existing configuration files are kept on upgrade.

use crate::tool_traits::ToolArgs;

/// Environment shared by every apt invocation.
fn noninteractive_env() -> Vec<(String, String)> {
    vec![
        ("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string()),
        ("NEEDRESTART_MODE".to_string(), "a".to_string()),
    ]
}

/// Keep locally modified config files when a package ships a new default.
fn keep_config_options() -> Vec<String> {
    vec![
        "-o".to_string(),
        "Dpkg::Options::=--force-confdef".to_string(),
        "-o".to_string(),
        "Dpkg::Options::=--force-confold".to_string(),
    ]
}

// ============================================================================
// apt-get update
// ============================================================================

/// `apt-get update`
#[derive(Debug, Clone, Default)]
pub struct AptUpdateArgs;

impl ToolArgs for AptUpdateArgs {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["update".to_string()]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        noninteractive_env()
    }

    fn streams_output(&self) -> bool {
        true
    }
}

// ============================================================================
// apt-get dist-upgrade
// ============================================================================

/// `apt-get -y dist-upgrade`, allowed to add and remove dependencies.
#[derive(Debug, Clone, Default)]
pub struct AptDistUpgradeArgs;

impl ToolArgs for AptDistUpgradeArgs {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string()];
        args.extend(keep_config_options());
        args.push("dist-upgrade".to_string());
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        noninteractive_env()
    }

    fn streams_output(&self) -> bool {
        true
    }
}

// ============================================================================
// apt-get autoremove
// ============================================================================

/// `apt-get -y autoremove`
#[derive(Debug, Clone, Default)]
pub struct AptAutoremoveArgs;

impl ToolArgs for AptAutoremoveArgs {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["-y".to_string(), "autoremove".to_string()]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        noninteractive_env()
    }

    fn streams_output(&self) -> bool {
        true
    }
}

// ============================================================================
// apt-get install
// ============================================================================

/// `apt-get install -y <packages...>`
#[derive(Debug, Clone)]
pub struct AptInstallArgs {
    pub packages: Vec<String>,
}

impl ToolArgs for AptInstallArgs {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["install".to_string(), "-y".to_string()];
        args.extend(keep_config_options());
        args.extend(self.packages.iter().cloned());
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        noninteractive_env()
    }

    fn streams_output(&self) -> bool {
        true
    }
}
