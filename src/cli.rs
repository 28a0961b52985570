use clap::Parser;
use std::path::PathBuf;

use crate::config_file::CliOverrides;

/// serverprep - harden a freshly provisioned Debian server in one pass
///
/// Installs baseline packages, creates a passwordless-sudo admin account that
/// trusts a single SSH key, hardens sshd and enables a deny-by-default
/// firewall.
#[derive(Parser, Debug)]
#[command(name = "serverprep")]
#[command(about = "One-shot hardening and admin provisioning for Debian servers")]
#[command(version)]
pub struct Cli {
    /// SSH port the daemon will listen on [default: 22]
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Admin account to create or reuse [default: debian]
    pub user: Option<String>,

    /// Public key line to authorize for the admin account (required unless
    /// --key-file or the config file supplies one)
    pub public_key: Option<String>,

    /// Read the public key from a file (first non-comment line)
    #[arg(long, value_name = "PATH")]
    pub key_file: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Package, account, file and service changes are skipped and logged.
    /// Read-only queries (getent, sudo -l, id, sshd -t) still execute so the
    /// preview is realistic.
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// The values that override the config file.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            ssh_port: self.port,
            admin_user: self.user.clone(),
            public_key: self.public_key.clone(),
            key_file: self.key_file.clone(),
        }
    }
}
