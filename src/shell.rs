//! Shell command facade used by intake and the pipeline.
//!
//! [`Shell`] turns a full shell command line into a [`CommandSpec`],
//! optionally wraps it in sudo, hands it to a [`CommandExecutor`] and maps
//! the outcome to `Ok(trimmed stdout)` or a [`ProvisionError`].

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use tracing::debug;

use crate::error::ProvisionError;
use crate::executor::{CommandExecutor, CommandSpec, DEFAULT_TIMEOUT};
use crate::privilege::{self, Credential};

/// Whether a command runs as the invoking user or as root.
#[derive(Debug, Clone, Copy)]
pub enum Elevation<'a> {
    /// Run as the invoking user.
    Unprivileged,
    /// Run as root using the given credential, if any.
    Elevated(Option<&'a Credential>),
}

/// Runs shell command lines to completion.
#[derive(Clone)]
pub struct Shell {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl Shell {
    /// Creates a shell with the default per-command timeout.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the default per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The default per-command timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The underlying executor.
    pub fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    /// Executes `command_line`, returning its trimmed stdout.
    ///
    /// An elevated request without a credential fails with
    /// [`ProvisionError::MissingCredential`] before anything is run.
    /// A non-zero exit becomes [`ProvisionError::CommandFailed`] carrying the
    /// command's stderr.
    pub fn execute(
        &self,
        command_line: &str,
        elevation: Elevation<'_>,
        timeout: Duration,
    ) -> Result<String, ProvisionError> {
        self.execute_in(None, command_line, elevation, timeout, None)
    }

    /// Runs `command_line` as the invoking user.
    pub fn run(&self, command_line: &str) -> Result<String, ProvisionError> {
        self.execute_in(None, command_line, Elevation::Unprivileged, self.timeout, None)
    }

    /// Runs `command_line` as the invoking user inside `dir`.
    pub fn run_in(&self, dir: &Utf8Path, command_line: &str) -> Result<String, ProvisionError> {
        self.execute_in(Some(dir), command_line, Elevation::Unprivileged, self.timeout, None)
    }

    /// Runs `command_line` as root.
    pub fn run_elevated(
        &self,
        command_line: &str,
        credential: Option<&Credential>,
    ) -> Result<String, ProvisionError> {
        self.execute_in(None, command_line, Elevation::Elevated(credential), self.timeout, None)
    }

    /// Runs `command_line` as root, masking `secret` in logs and errors.
    pub fn run_elevated_redacted(
        &self,
        command_line: &str,
        credential: Option<&Credential>,
        secret: &str,
    ) -> Result<String, ProvisionError> {
        self.execute_in(
            None,
            command_line,
            Elevation::Elevated(credential),
            self.timeout,
            Some(secret),
        )
    }

    fn execute_in(
        &self,
        cwd: Option<&Utf8Path>,
        command_line: &str,
        elevation: Elevation<'_>,
        timeout: Duration,
        secret: Option<&str>,
    ) -> Result<String, ProvisionError> {
        let shown = match secret {
            Some(secret) if !secret.is_empty() => command_line.replace(secret, "<redacted>"),
            _ => command_line.to_string(),
        };
        let spec = match elevation {
            Elevation::Unprivileged => {
                debug!("exec: {}", shown);
                privilege::plain_spec(command_line)
            }
            Elevation::Elevated(None) => return Err(ProvisionError::MissingCredential),
            Elevation::Elevated(Some(credential)) => {
                debug!("exec (elevated): {}", shown);
                privilege::elevated_spec(command_line, credential)
            }
        };
        let mut spec: CommandSpec = spec.with_timeout(timeout);
        if let Some(dir) = cwd {
            spec = spec.with_cwd(dir.to_owned());
        }

        let result = self.executor.execute(&spec)?;
        if result.exit_succeeded {
            Ok(result.stdout.trim().to_string())
        } else {
            Err(ProvisionError::CommandFailed {
                command: shown,
                stderr: result.stderr.trim().to_string(),
            })
        }
    }
}
