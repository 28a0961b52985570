//! Error handling module for serverprep
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every stage returns these types; the binary maps them to an exit status.

use thiserror::Error;

/// Main error type for serverprep
#[derive(Error, Debug)]
pub enum ServerPrepError {
    /// IO errors (file operations on the host)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Preconditions that must hold before any mutation (root, public key)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Validation errors (user input, config values)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration file errors (loading, parsing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external tool could not be started at all
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An external tool exited non-zero
    #[error("{step} failed (exit code {code}): {stderr}")]
    Command {
        step: String,
        code: i32,
        stderr: String,
    },

    /// Tools later stages depend on are still absent after installation
    #[error("Required tools missing after package installation: {0}")]
    MissingTools(String),

    /// The SSH daemon rejected the hardened configuration
    #[error("SSH daemon rejected configuration {path}: {detail}")]
    InvalidSshConfig { path: String, detail: String },

    /// Run state machine transition errors
    #[error("Stage transition error: {0}")]
    StageTransition(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for serverprep operations
pub type Result<T> = std::result::Result<T, ServerPrepError>;

impl ServerPrepError {
    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a command failure error
    pub fn command(step: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        Self::Command {
            step: step.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Create a stage transition error
    pub fn stage_transition(msg: impl Into<String>) -> Self {
        Self::StageTransition(msg.into())
    }

    /// Process exit status for this error.
    ///
    /// Input and precondition problems exit with 2 (nothing was touched),
    /// everything else with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Precondition(_) | Self::Validation(_) | Self::Config(_) | Self::Json(_) => 2,
            _ => 1,
        }
    }
}
