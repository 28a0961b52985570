//! Type-Safe Tool Execution
//!
//! Every external program goes through a `CommandRunner`. Stages never touch
//! `std::process::Command` directly; they build a `ToolArgs` struct and hand it
//! to `run_tool_safe` or `run_tool_checked`. This keeps the host behind a
//! narrow port that tests can replace and that dry-run mode can intercept.

use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Result, ServerPrepError};
use crate::tool_traits::ToolArgs;

/// A fully-resolved external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Whether the invocation mutates host state.
    pub destructive: bool,
    /// Inherit stdout/stderr instead of capturing them.
    pub stream_output: bool,
}

impl Invocation {
    /// Build an invocation from typed tool arguments.
    pub fn from_args<T: ToolArgs + ?Sized>(args: &T) -> Self {
        Self {
            program: args.program().to_string(),
            args: args.to_cli_args(),
            env: args.get_env_vars(),
            destructive: args.is_destructive(),
            stream_output: args.streams_output(),
        }
    }

    /// `program arg1 arg2 ...` for logs and error messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Standard output (empty when output was streamed).
    pub stdout: String,
    /// Standard error (empty when output was streamed).
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the tool exited successfully (exit code 0).
    pub success: bool,
}

impl ToolOutput {
    /// A successful result carrying `stdout`.
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
            success: false,
        }
    }

    /// Check if the tool succeeded and return an error if not.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(ServerPrepError::command(
                context,
                self.exit_code.unwrap_or(-1),
                self.stderr.trim(),
            ))
        }
    }
}

/// Port through which every external program is executed.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run the invocation to completion. A non-zero exit is NOT an error here;
    /// only failure to start the program is.
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;

    /// Whether destructive invocations are being skipped.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Production runner backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        if self.dry_run && invocation.destructive {
            info!("[dry-run] would run: {}", invocation.command_line());
            return Ok(ToolOutput::succeeded(""));
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).stdin(Stdio::null());
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        let spawn_error = |source| ServerPrepError::Spawn {
            program: invocation.program.clone(),
            source,
        };

        if invocation.stream_output {
            let status = cmd
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(spawn_error)?;
            return Ok(ToolOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: status.code(),
                success: status.success(),
            });
        }

        let output = cmd.output().map_err(spawn_error)?;
        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        })
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Execute a tool with type-safe arguments and return its output, whatever
/// the exit status.
///
/// Use this for queries whose exit code carries meaning (`getent`,
/// `systemctl is-active`, `sshd -t`).
pub fn run_tool_safe<T: ToolArgs + ?Sized>(runner: &dyn CommandRunner, args: &T) -> Result<ToolOutput> {
    let invocation = Invocation::from_args(args);
    debug!(
        "run_tool_safe: {} env={:?}",
        invocation.command_line(),
        invocation.env
    );

    let output = runner.run(&invocation)?;
    if !output.success {
        debug!(
            "{} exited with code {}",
            invocation.program,
            output.exit_code.unwrap_or(-1)
        );
    }
    Ok(output)
}

/// Execute a tool and fail unless it exits 0.
pub fn run_tool_checked<T: ToolArgs + ?Sized>(runner: &dyn CommandRunner, args: &T) -> Result<ToolOutput> {
    let output = run_tool_safe(runner, args)?;
    output.ensure_success(&args.command_line())?;
    Ok(output)
}
