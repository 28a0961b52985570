//! serverprep Library
//!
//! One-shot hardening and admin provisioning for freshly provisioned Debian
//! servers: packages, admin account, sshd and firewall, in that order.

pub mod bootstrap;
pub mod cli;
pub mod config_file;
pub mod engine;
pub mod error;
pub mod host_fs;
pub mod params;
pub mod run_state;
pub mod sanity;
pub mod stages;
pub mod tool_runner;
pub mod tool_traits;
pub mod tools;

// Re-export main types for convenience
pub use bootstrap::{Bootstrapper, RunSummary};
pub use config_file::{BootstrapConfig, CliOverrides, resolve_settings};
pub use engine::sshd_config::{HardeningDirective, SshdConfig, hardening_policy};
pub use error::{Result, ServerPrepError};
pub use host_fs::{HostFs, LocalFs};
pub use params::{InvocationParams, RunOptions, Settings};
pub use run_state::{RunContext, RunStage, StageTransitionError};
pub use sanity::SanityCheckResult;
pub use tool_runner::{CommandRunner, Invocation, SystemRunner, ToolOutput, run_tool_checked, run_tool_safe};
pub use tool_traits::ToolArgs;
