//! Configuration file handling.
//!
//! A JSON file can pre-seed any positional input and change the knobs that
//! have no positional form. Every field is optional.
//!
//! Precedence, highest first: positional arguments, `--key-file`, config
//! file, built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ServerPrepError};
use crate::params::{InvocationParams, RunOptions, Settings};

/// Contents of a `--config` JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    pub ssh_port: Option<u16>,
    pub admin_user: Option<String>,
    pub public_key: Option<String>,
    pub public_key_file: Option<PathBuf>,
    pub admin_group: Option<String>,
    pub admin_shell: Option<String>,
    pub extra_packages: Vec<String>,
    pub sshd_config: Option<PathBuf>,
    pub ssh_service: Option<String>,
}

impl BootstrapConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            ServerPrepError::config(format!(
                "Failed to read configuration from {}: {e}",
                path.as_ref().display()
            ))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            ServerPrepError::config(format!(
                "Failed to parse configuration {}: {e}",
                path.as_ref().display()
            ))
        })?;

        config.validate()?;
        debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate the fields that are not re-checked by `InvocationParams`.
    pub fn validate(&self) -> Result<()> {
        if self.ssh_port == Some(0) {
            return Err(ServerPrepError::config("ssh_port must be between 1 and 65535"));
        }

        for package in &self.extra_packages {
            let valid = !package.is_empty()
                && !package.starts_with('-')
                && package
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | ':' | '=' | '~'));
            if !valid {
                return Err(ServerPrepError::config(format!(
                    "Invalid package name in extra_packages: {package:?}"
                )));
            }
        }

        if let Some(ref shell) = self.admin_shell {
            if !shell.starts_with('/') {
                return Err(ServerPrepError::config(format!(
                    "admin_shell must be an absolute path, got {shell:?}"
                )));
            }
        }

        if let Some(ref group) = self.admin_group {
            if group.trim().is_empty() || group.contains(char::is_whitespace) {
                return Err(ServerPrepError::config("admin_group must be a single group name"));
            }
        }

        if let Some(ref service) = self.ssh_service {
            if service.trim().is_empty() || service.contains(char::is_whitespace) {
                return Err(ServerPrepError::config("ssh_service must be a single unit name"));
            }
        }

        if let Some(ref path) = self.sshd_config {
            if !path.is_absolute() {
                return Err(ServerPrepError::config(format!(
                    "sshd_config must be an absolute path, got {}",
                    path.display()
                )));
            }
        }

        Ok(())
    }
}

/// Values given on the command line, before defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub ssh_port: Option<u16>,
    pub admin_user: Option<String>,
    pub public_key: Option<String>,
    pub key_file: Option<PathBuf>,
}

/// Read a public key file, keeping the first non-empty, non-comment line.
pub fn read_key_file(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|e| {
        ServerPrepError::config(format!(
            "Failed to read public key file {}: {e}",
            path.display()
        ))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .unwrap_or_default()
        .to_string())
}

/// Merge command line, config file and defaults into `Settings`.
///
/// An explicitly given positional key wins even when empty, so that
/// `serverprep 22 debian ""` is rejected rather than silently falling back.
pub fn resolve_settings(cli: &CliOverrides, file: &BootstrapConfig) -> Result<Settings> {
    let defaults = InvocationParams::default();
    let public_key = match (&cli.public_key, &cli.key_file) {
        (Some(key), _) => key.clone(),
        (None, Some(path)) => read_key_file(path)?,
        (None, None) => match (&file.public_key, &file.public_key_file) {
            (Some(key), _) => key.clone(),
            (None, Some(path)) => read_key_file(path)?,
            (None, None) => defaults.public_key,
        },
    };

    let params = InvocationParams {
        ssh_port: cli.ssh_port.or(file.ssh_port).unwrap_or(defaults.ssh_port),
        admin_user: cli
            .admin_user
            .clone()
            .or_else(|| file.admin_user.clone())
            .unwrap_or(defaults.admin_user),
        public_key,
    };

    let base = RunOptions::default();
    let options = RunOptions {
        admin_group: file.admin_group.clone().unwrap_or(base.admin_group),
        admin_shell: file.admin_shell.clone().unwrap_or(base.admin_shell),
        extra_packages: file.extra_packages.clone(),
        sshd_config: file.sshd_config.clone().unwrap_or(base.sshd_config),
        ssh_service: file.ssh_service.clone().unwrap_or(base.ssh_service),
    };

    Ok(Settings { params, options })
}
