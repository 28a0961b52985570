//! Invocation parameters and input validation.
//!
//! `InvocationParams` carries the three positional inputs; `RunOptions` carries
//! the knobs only the config file can change. Validation is pure and runs
//! before anything touches the host.

use std::path::PathBuf;

use crate::error::{Result, ServerPrepError};

/// Port sshd listens on when none is given.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Admin account name when none is given.
pub const DEFAULT_ADMIN_USER: &str = "debian";

/// Group that grants sudo on Debian.
pub const DEFAULT_ADMIN_GROUP: &str = "sudo";

/// Login shell for a newly created admin account.
pub const DEFAULT_ADMIN_SHELL: &str = "/bin/bash";

/// Main SSH daemon configuration file.
pub const DEFAULT_SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

/// systemd unit name of the SSH daemon on Debian.
pub const DEFAULT_SSH_SERVICE: &str = "ssh";

/// Longest login name `useradd` accepts.
const MAX_USERNAME_LEN: usize = 32;

/// The three positional inputs after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationParams {
    pub ssh_port: u16,
    pub admin_user: String,
    pub public_key: String,
}

impl Default for InvocationParams {
    fn default() -> Self {
        Self {
            ssh_port: DEFAULT_SSH_PORT,
            admin_user: DEFAULT_ADMIN_USER.to_string(),
            public_key: String::new(),
        }
    }
}

impl InvocationParams {
    /// Check every input. The missing-key check comes first so that a bare
    /// invocation names the key as the problem.
    pub fn validate(&self) -> Result<()> {
        if self.public_key.trim().is_empty() {
            return Err(ServerPrepError::precondition(
                "SSH public key is required (pass it as the third argument or use --key-file)",
            ));
        }
        if self.public_key.trim().contains(['\n', '\r']) {
            return Err(ServerPrepError::validation(
                "SSH public key must be a single line",
            ));
        }
        if self.ssh_port == 0 {
            return Err(ServerPrepError::validation(
                "SSH port must be between 1 and 65535",
            ));
        }
        validate_username(&self.admin_user)
    }

    /// The key exactly as it will be written to `authorized_keys`.
    pub fn authorized_key_line(&self) -> String {
        format!("{}\n", self.public_key.trim())
    }
}

/// Validate a login name: lowercase letter or underscore first, then
/// lowercase letters, digits, underscores or hyphens.
pub fn validate_username(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ServerPrepError::validation("Username must be specified"));
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(ServerPrepError::validation(format!(
            "Username must be at most {MAX_USERNAME_LEN} characters long"
        )));
    }
    if let Some(first) = name.chars().next() {
        if !(first.is_ascii_lowercase() || first == '_') {
            return Err(ServerPrepError::validation(
                "Username must start with a lowercase letter or underscore",
            ));
        }
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ServerPrepError::validation(
            "Username can only contain lowercase letters, digits, underscores and hyphens",
        ));
    }
    if name == "root" {
        return Err(ServerPrepError::validation(
            "Admin user cannot be root (root login is disabled by hardening)",
        ));
    }
    Ok(())
}

/// Settings that only the config file can change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub admin_group: String,
    pub admin_shell: String,
    pub extra_packages: Vec<String>,
    pub sshd_config: PathBuf,
    pub ssh_service: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            admin_group: DEFAULT_ADMIN_GROUP.to_string(),
            admin_shell: DEFAULT_ADMIN_SHELL.to_string(),
            extra_packages: Vec::new(),
            sshd_config: PathBuf::from(DEFAULT_SSHD_CONFIG),
            ssh_service: DEFAULT_SSH_SERVICE.to_string(),
        }
    }
}

/// Everything a run needs, fully resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub params: InvocationParams,
    pub options: RunOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_params() -> InvocationParams {
        InvocationParams {
            ssh_port: 2222,
            admin_user: "opuser".to_string(),
            public_key: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIExample opuser@laptop".to_string(),
        }
    }

    #[test]
    fn test_defaults() {
        let params = InvocationParams::default();
        assert_eq!(params.ssh_port, 22);
        assert_eq!(params.admin_user, "debian");
        assert!(params.public_key.is_empty());

        let options = RunOptions::default();
        assert_eq!(options.admin_group, "sudo");
        assert_eq!(options.sshd_config, PathBuf::from("/etc/ssh/sshd_config"));
    }

    #[test]
    fn test_valid_params() {
        assert!(valid_params().validate().is_ok());
    }

    #[test]
    fn test_missing_key_is_precondition() {
        let err = InvocationParams::default().validate().unwrap_err();
        assert!(matches!(err, ServerPrepError::Precondition(_)));
        assert!(err.to_string().contains("public key"));

        let mut params = valid_params();
        params.public_key = "   ".to_string();
        assert!(matches!(
            params.validate().unwrap_err(),
            ServerPrepError::Precondition(_)
        ));
    }

    #[test]
    fn test_missing_key_reported_before_other_problems() {
        let params = InvocationParams {
            ssh_port: 0,
            admin_user: "Bad User".to_string(),
            public_key: String::new(),
        };
        assert!(params.validate().unwrap_err().to_string().contains("public key"));
    }

    #[test]
    fn test_multiline_key_rejected() {
        let mut params = valid_params();
        params.public_key = "ssh-ed25519 AAAA\nssh-rsa BBBB".to_string();
        assert!(matches!(
            params.validate().unwrap_err(),
            ServerPrepError::Validation(_)
        ));
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut params = valid_params();
        params.ssh_port = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("debian").is_ok());
        assert!(validate_username("_svc").is_ok());
        assert!(validate_username("ops-admin2").is_ok());

        assert!(validate_username("").is_err());
        assert!(validate_username("Admin").is_err());
        assert!(validate_username("2admin").is_err());
        assert!(validate_username("op.user").is_err());
        assert!(validate_username("op user").is_err());
        assert!(validate_username("root").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_authorized_key_line_is_trimmed_single_line() {
        let mut params = valid_params();
        params.public_key = "  ssh-ed25519 AAAA opuser@laptop \n".to_string();
        assert_eq!(
            params.authorized_key_line(),
            "ssh-ed25519 AAAA opuser@laptop\n"
        );
    }
}
