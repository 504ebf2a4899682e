//! Command execution abstraction for logic-installer.
//!
//! This module provides:
//! - [`CommandSpec`]: Specification for a process to run
//! - [`CommandResult`]: Captured outcome of one process
//! - [`CommandExecutor`]: Trait for command execution strategies
//! - [`RealCommandExecutor`]: Production implementation using `std::process::Command`

mod pipe;
mod real;

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::error::ProvisionError;
use crate::privilege::Credential;

pub use real::RealCommandExecutor;

/// Default time limit for a single command, long enough for package-manager runs.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);

/// Formats string arguments into a space-separated, debug-quoted string.
///
/// Used by error messages and dry-run output to consistently format
/// command arguments (e.g., `"-c" "apt-get -y install nginx"`).
pub(crate) fn format_command_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Specification for a command to be executed
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The program to execute (e.g., "bash", "sudo")
    pub command: String,
    /// Program arguments
    pub args: Vec<String>,
    /// Working directory (optional, defaults to current directory)
    pub cwd: Option<Utf8PathBuf>,
    /// Environment variables to set (in addition to inherited environment)
    pub env: Vec<(String, String)>,
    /// Secret written to the process's stdin, followed by a newline
    pub stdin: Option<Credential>,
    /// Maximum wall-clock time before the process is killed
    pub timeout: Duration,
}

impl CommandSpec {
    /// Creates a new CommandSpec with command and args
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            env: Vec::new(),
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the working directory
    #[must_use]
    pub fn with_cwd(mut self, cwd: Utf8PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    /// Adds an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Feeds the given credential to the process on stdin
    #[must_use]
    pub fn with_stdin(mut self, credential: Credential) -> Self {
        self.stdin = Some(credential);
        self
    }

    /// Sets the time limit
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Renders the command for logs and error messages.
    ///
    /// Never includes the stdin payload.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, format_command_args(&self.args))
        }
    }
}

/// Result of command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Whether the process exited with status zero (always true in dry-run mode)
    pub exit_succeeded: bool,
    /// Exit code if the process exited normally
    pub code: Option<i32>,
}

impl CommandResult {
    /// A successful result with the given stdout and no stderr.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_succeeded: true,
            code: Some(0),
        }
    }

    /// A failed result with the given stderr and exit code 1.
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_succeeded: false,
            code: Some(1),
        }
    }
}

/// Trait for command execution.
///
/// Implementations must be `Send + Sync` so an executor can be shared as
/// `Arc<dyn CommandExecutor>` between intake and the pipeline.
///
/// A non-zero exit is reported through [`CommandResult::exit_succeeded`],
/// not as an `Err`. Errors are reserved for processes that could not be
/// started, supervised, or finished in time.
pub trait CommandExecutor: Send + Sync {
    /// Executes a command with the given specification.
    fn execute(&self, spec: &CommandSpec) -> Result<CommandResult, ProvisionError>;
}
