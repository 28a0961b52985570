//! Run State Machine
//!
//! Authoritative record of how far a run has progressed. Stages can only move
//! forward one step at a time, and any non-terminal stage can fall into
//! `Failed`.
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! Validating
//!     ↓
//! PackagesUpdating
//!     ↓
//! UserProvisioning
//!     ↓
//! SshHardening
//!     ↓
//! FirewallConfiguring
//!     ↓
//! Done
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use std::fmt;

use thiserror::Error;

/// Run stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RunStage {
    /// Nothing has happened yet
    #[default]
    NotStarted = 0,

    /// Checking inputs and preconditions; no host mutation allowed
    Validating = 1,

    /// Refreshing, upgrading and installing packages
    PackagesUpdating = 2,

    /// Creating the admin account, sudo grant and authorized key
    UserProvisioning = 3,

    /// Rewriting sshd_config, validating it and restarting the daemon
    SshHardening = 4,

    /// Applying the firewall policy
    FirewallConfiguring = 5,

    /// Run completed successfully (terminal state)
    Done = 6,

    /// Run failed (terminal state)
    Failed = 255,
}

impl RunStage {
    /// Returns the numeric order of this stage (0-6, 255 for Failed)
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (Done or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if this stage mutates host state
    #[inline]
    pub const fn mutates_host(self) -> bool {
        matches!(
            self,
            Self::PackagesUpdating
                | Self::UserProvisioning
                | Self::SshHardening
                | Self::FirewallConfiguring
        )
    }

    /// Returns the next stage in the sequence, or None if at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::Validating),
            Self::Validating => Some(Self::PackagesUpdating),
            Self::PackagesUpdating => Some(Self::UserProvisioning),
            Self::UserProvisioning => Some(Self::SshHardening),
            Self::SshHardening => Some(Self::FirewallConfiguring),
            Self::FirewallConfiguring => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Returns a human-readable description of this stage
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Validating => "Validating inputs",
            Self::PackagesUpdating => "Updating packages",
            Self::UserProvisioning => "Provisioning admin user",
            Self::SshHardening => "Hardening SSH daemon",
            Self::FirewallConfiguring => "Configuring firewall",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    /// Returns all stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::Validating,
            Self::PackagesUpdating,
            Self::UserProvisioning,
            Self::SshHardening,
            Self::FirewallConfiguring,
            Self::Done,
        ]
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    /// Attempted to skip one or more stages
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: RunStage, to: RunStage },

    /// Attempted to go backwards
    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: RunStage, to: RunStage },

    /// Attempted to transition from a terminal state
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: RunStage },

    /// Attempted to transition to the same state
    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: RunStage },
}

/// Tracks the current stage of a run.
///
/// # Example
///
/// ```
/// use serverprep::run_state::{RunContext, RunStage};
///
/// let mut ctx = RunContext::new();
/// ctx.transition_to(RunStage::Validating).unwrap();
/// assert!(ctx.transition_to(RunStage::SshHardening).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    current: RunStage,
    failed_at: Option<RunStage>,
    /// Entered stages with unix timestamps
    stage_history: Vec<(RunStage, u64)>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            current: RunStage::NotStarted,
            failed_at: None,
            stage_history: Vec::with_capacity(RunStage::all_stages().len()),
        }
    }

    #[inline]
    pub fn current_stage(&self) -> RunStage {
        self.current
    }

    /// Stage at which failure occurred, if any
    #[inline]
    pub fn failed_at(&self) -> Option<RunStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.current == RunStage::Done
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == RunStage::Failed
    }

    pub fn stage_history(&self) -> &[(RunStage, u64)] {
        &self.stage_history
    }

    /// Transition to `target`, which must be the immediate next stage.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if current is Done or Failed
    /// - `AlreadyAtStage` if target is the current stage
    /// - `BackwardTransition` if target is before current
    /// - `SkippedStage` if target is not the immediate next stage
    pub fn transition_to(&mut self, target: RunStage) -> Result<RunStage, StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(StageTransitionError::AlreadyAtStage { stage: target });
        }
        // Failed is only reachable through fail()
        if target == RunStage::Failed {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        if target.order() < self.current.order() {
            return Err(StageTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        self.record_stage_transition(target);
        self.current = target;
        Ok(target)
    }

    /// Mark the run as failed, remembering where.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if already Done or Failed
    pub fn fail(&mut self) -> Result<(), StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }

        self.failed_at = Some(self.current);
        self.record_stage_transition(RunStage::Failed);
        self.current = RunStage::Failed;
        Ok(())
    }

    fn record_stage_transition(&mut self, stage: RunStage) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.stage_history.push((stage, timestamp));
    }
}

impl From<StageTransitionError> for crate::error::ServerPrepError {
    fn from(err: StageTransitionError) -> Self {
        crate::error::ServerPrepError::StageTransition(err.to_string())
    }
}
