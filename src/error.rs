//! Domain-specific error types for logic-installer.
//!
//! This module defines `ProvisionError`, a `thiserror`-based enum that
//! provides typed error variants for every way a provisioning run can
//! abort. Library functions return `Result<T, ProvisionError>` so callers
//! can match on the failing condition, while the binary boundary uses
//! `anyhow::Result`.
//!
//! `ProvisionError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically where `anyhow::Result` is returned.

use std::io;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)").
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for logic-installer.
///
/// Every variant is fatal to the run. The only recovery in the system is the
/// credential prompt in intake, which retries on a rejected password before
/// giving up with [`ProvisionError::InvalidCredential`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProvisionError {
    /// The detected distribution has no descriptor.
    #[error("{0} is not currently supported by this installer")]
    UnsupportedDistro(String),

    /// The distribution is known but the release is not on its allow-list.
    #[error("{distro} release {release} is not currently supported")]
    UnsupportedRelease {
        /// Distribution identifier as detected.
        distro: String,
        /// Release string as detected.
        release: String,
    },

    /// An elevated command was requested but no privileged credential is available.
    #[error("command requires elevated privileges but no credential was provided")]
    MissingCredential,

    /// The privileged credential was rejected on every attempt.
    #[error("privileged credential was rejected after {attempts} attempt(s)")]
    InvalidCredential {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The installer was started as root.
    #[error(
        "you must run this installer as the user the application will run under, \
        not as 'root'"
    )]
    RootUser,

    /// A command ran and exited with a non-zero status.
    #[error("command failed: {command}: {stderr}")]
    CommandFailed {
        /// The command line that was executed (never contains the credential).
        command: String,
        /// Captured standard error of the command.
        stderr: String,
    },

    /// A command did not finish within its time limit and was killed.
    #[error("command timed out after {seconds}s: {command}")]
    Timeout {
        /// The command line that was executed.
        command: String,
        /// The time limit that elapsed.
        seconds: u64,
    },

    /// A command could not be started or supervised.
    #[error("failed to run command: {command}: {message}")]
    Spawn {
        /// The command line that was being started.
        command: String,
        /// Human-readable reason (spawn failure, wait failure, reader thread panic).
        message: String,
    },

    /// Command output did not contain an expected labelled line.
    #[error("could not detect {0}")]
    UndetectedField(String),

    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// The settings file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred, usually a path.
        context: String,
        /// Human-readable description derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A pipeline step failed; carries the step name and the underlying error.
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        /// Name of the failing step.
        step: String,
        /// The error that aborted the step.
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    /// Creates an `Io` variant with the `message` field derived from `source`.
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Returns the innermost error, looking through `StepFailed` wrappers.
    pub fn root_cause(&self) -> &ProvisionError {
        match self {
            Self::StepFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
