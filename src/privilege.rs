//! Privilege escalation.
//!
//! Elevated commands run through `sudo -S`, which reads the operator's
//! password from stdin. The password therefore never appears on a command
//! line, in a process listing, or in a log line.

use std::fmt;
use std::time::Duration;

use crate::error::ProvisionError;
use crate::executor::{CommandExecutor, CommandSpec};

/// The program used for privilege escalation.
pub const SUDO: &str = "sudo";

/// A privileged credential (the invoking user's sudo password).
///
/// `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the secret text. Only the executor's stdin writer should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Set on commands run as the invoking user. Their stdin is closed, so git
/// and Composer must fail rather than wait on a prompt.
pub const NON_INTERACTIVE_ENV: &[(&str, &str)] =
    &[("GIT_TERMINAL_PROMPT", "0"), ("COMPOSER_NO_INTERACTION", "1")];

/// Builds the [`CommandSpec`] for running `command_line` through `bash -c`.
pub fn plain_spec(command_line: &str) -> CommandSpec {
    NON_INTERACTIVE_ENV.iter().fold(
        CommandSpec::new("bash", vec!["-c".to_string(), command_line.to_string()]),
        |spec, (key, value)| spec.with_env(*key, *value),
    )
}

/// Builds the [`CommandSpec`] for running `command_line` as root via `sudo -S bash -c`.
///
/// The empty prompt (`-p ''`) keeps sudo's password prompt out of the
/// captured stderr. `-k` ignores any cached timestamp so sudo always
/// consumes the password line; otherwise it would stay on stdin for the
/// wrapped command to read as input.
pub fn elevated_spec(command_line: &str, credential: &Credential) -> CommandSpec {
    CommandSpec::new(
        SUDO,
        vec![
            "-k".to_string(),
            "-S".to_string(),
            "-p".to_string(),
            String::new(),
            "--".to_string(),
            "bash".to_string(),
            "-c".to_string(),
            command_line.to_string(),
        ],
    )
    .with_stdin(credential.clone())
}

/// Checks whether sudo accepts `credential`.
///
/// `-k` discards any cached timestamp so the password is really verified.
/// Returns `Ok(false)` for a rejected password; errors only when sudo could
/// not be run at all.
pub fn validate_credential(
    executor: &dyn CommandExecutor,
    credential: &Credential,
    timeout: Duration,
) -> Result<bool, ProvisionError> {
    let spec = CommandSpec::new(
        SUDO,
        vec!["-S".to_string(), "-k".to_string(), "-p".to_string(), String::new(), "-v".to_string()],
    )
    .with_stdin(credential.clone())
    .with_timeout(timeout);
    let result = executor.execute(&spec)?;
    if !result.exit_succeeded {
        tracing::debug!("sudo rejected credential: {}", result.stderr.trim());
    }
    Ok(result.exit_succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_is_redacted() {
        let credential = Credential::new("s3cret");
        assert_eq!(format!("{:?}", credential), "Credential(<redacted>)");
        assert_eq!(credential.to_string(), "<redacted>");
        assert_eq!(credential.expose(), "s3cret");
    }

    #[test]
    fn plain_spec_runs_through_bash() {
        let spec = plain_spec("cd logic && npm install");
        assert_eq!(spec.command, "bash");
        assert_eq!(spec.args, vec!["-c", "cd logic && npm install"]);
        assert!(spec.stdin.is_none());
        assert!(
            spec.env
                .contains(&("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()))
        );
    }

    #[test]
    fn elevated_spec_passes_password_on_stdin() {
        let credential = Credential::new("s3cret");
        let spec = elevated_spec("apt-get -y install nginx", &credential);
        assert_eq!(spec.command, "sudo");
        assert_eq!(spec.args.last().map(String::as_str), Some("apt-get -y install nginx"));
        assert!(spec.args.iter().all(|a| !a.contains("s3cret")));
        assert_eq!(spec.stdin.as_ref(), Some(&credential));
    }

    #[test]
    fn elevated_spec_always_reads_password() {
        let spec = elevated_spec("apt-get -y install nginx", &Credential::new("pw"));
        let end_of_options = spec.args.iter().position(|a| a == "--").unwrap();
        let sudo_options = &spec.args[..end_of_options];
        assert!(sudo_options.contains(&"-k".to_string()));
        assert!(sudo_options.contains(&"-S".to_string()));
    }

    #[test]
    fn elevated_spec_keeps_command_as_single_argument() {
        let spec = elevated_spec("echo 'a b' | tee /tmp/x", &Credential::new("pw"));
        let idx = spec.args.iter().position(|a| a == "-c").unwrap();
        assert_eq!(spec.args[idx + 1], "echo 'a b' | tee /tmp/x");
        assert_eq!(spec.args.len(), idx + 2);
    }
}
