//! Type-safe arguments for `ufw`.

use strum::{Display, EnumString};

use crate::tool_traits::ToolArgs;

/// Traffic direction for a default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Default policy verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Policy {
    Allow,
    Deny,
}

/// `ufw --force reset`: disable the firewall and delete every rule.
#[derive(Debug, Clone, Default)]
pub struct UfwResetArgs;

impl ToolArgs for UfwResetArgs {
    fn program(&self) -> &'static str {
        "ufw"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["--force".to_string(), "reset".to_string()]
    }
}

/// `ufw default <policy> <direction>`
#[derive(Debug, Clone)]
pub struct UfwDefaultArgs {
    pub policy: Policy,
    pub direction: Direction,
}

impl ToolArgs for UfwDefaultArgs {
    fn program(&self) -> &'static str {
        "ufw"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "default".to_string(),
            self.policy.to_string(),
            self.direction.to_string(),
        ]
    }
}

/// `ufw allow <port>/tcp`
#[derive(Debug, Clone)]
pub struct UfwAllowArgs {
    pub port: u16,
}

impl ToolArgs for UfwAllowArgs {
    fn program(&self) -> &'static str {
        "ufw"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["allow".to_string(), format!("{}/tcp", self.port)]
    }
}

/// `ufw --force enable` (no interactive confirmation)
#[derive(Debug, Clone, Default)]
pub struct UfwEnableArgs;

impl ToolArgs for UfwEnableArgs {
    fn program(&self) -> &'static str {
        "ufw"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["--force".to_string(), "enable".to_string()]
    }
}
