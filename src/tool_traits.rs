//! Type-safe tool argument contracts.
//!
//! Every external program serverprep invokes (apt-get, useradd, sshd, ufw, ...)
//! is described by a struct implementing `ToolArgs`. The struct definition is
//! the contract: flag spelling mistakes are caught at compile time and the
//! dry-run layer knows which invocations mutate the host.

/// Trait for typed tool arguments.
///
/// # Contract
///
/// - `program()`: executable name, resolved through `PATH` at execution time.
/// - `to_cli_args()`: arguments exactly as the program expects them.
/// - `get_env_vars()`: extra environment variables for the invocation.
/// - `is_destructive()`: `true` if the invocation changes host state. Queries
///   return `false` so they still run in dry-run mode.
/// - `streams_output()`: `true` for long-running commands whose output should
///   go straight to the operator's terminal instead of being captured.
///
/// # Example
///
/// ```
/// use serverprep::tool_traits::ToolArgs;
/// use serverprep::tools::firewall::UfwAllowArgs;
///
/// let args = UfwAllowArgs { port: 2222 };
/// assert_eq!(args.program(), "ufw");
/// assert_eq!(args.to_cli_args(), vec!["allow", "2222/tcp"]);
/// assert!(args.is_destructive());
/// ```
pub trait ToolArgs {
    /// Get the program name (e.g., "apt-get").
    fn program(&self) -> &'static str;

    /// Convert struct fields to CLI arguments.
    fn to_cli_args(&self) -> Vec<String>;

    /// Get required environment variables.
    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }

    /// Whether running this invocation mutates the host.
    fn is_destructive(&self) -> bool {
        true
    }

    /// Whether stdout/stderr should be inherited rather than captured.
    fn streams_output(&self) -> bool {
        false
    }

    /// Human-readable command line, used in logs and error messages.
    fn command_line(&self) -> String {
        crate::tool_runner::Invocation::from_args(self).command_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoArgs {
        words: Vec<String>,
    }

    impl ToolArgs for EchoArgs {
        fn program(&self) -> &'static str {
            "echo"
        }

        fn to_cli_args(&self) -> Vec<String> {
            self.words.clone()
        }
    }

    #[test]
    fn test_defaults_are_conservative() {
        let args = EchoArgs { words: vec![] };
        assert!(args.is_destructive());
        assert!(!args.streams_output());
        assert!(args.get_env_vars().is_empty());
    }

    #[test]
    fn test_command_line_joins_args() {
        let args = EchoArgs {
            words: vec!["hello".to_string(), "world".to_string()],
        };
        assert_eq!(args.command_line(), "echo hello world");

        let bare = EchoArgs { words: vec![] };
        assert_eq!(bare.command_line(), "echo");
    }
}
