//! Installer settings.
//!
//! Every setting has a built-in default, so the installer runs without a
//! settings file. A YAML file passed with `--config` overrides individual
//! values:
//!
//! ```yaml
//! application:
//!   repository: https://github.com/Vocalogic/logic
//! database:
//!   name: logic
//! command_timeout_secs: 1200
//! ```

use std::fs::File;
use std::io::BufReader;
use std::sync::LazyLock;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ProvisionError;

/// Longest accepted per-command time limit: one day.
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 86_400;

static SQL_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern is valid"));

static FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("file name pattern is valid"));

/// Where the application comes from and where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApplicationSettings {
    /// Git URL cloned into the invoking user's home directory.
    pub repository: String,
    /// Checkout directory name under the home directory; also the program name.
    pub directory: String,
    /// Worker log file name under the home directory.
    pub worker_log: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            repository: "https://www.github.com/Vocalogic/logic".to_string(),
            directory: "logic".to_string(),
            worker_log: "logic-worker.log".to_string(),
        }
    }
}

/// Database and account created for the application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct DatabaseSettings {
    pub name: String,
    pub user: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            name: "logic".to_string(),
            user: "logic".to_string(),
        }
    }
}

/// Download locations for the tooling bootstrap scripts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct SourceSettings {
    pub composer_installer: String,
    /// Overrides the NodeSource script chosen for the distribution.
    pub node_setup: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            composer_installer: "https://getcomposer.org/installer".to_string(),
            node_setup: None,
        }
    }
}

/// All installer settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub sources: SourceSettings,
    /// Per-command time limit.
    pub command_timeout_secs: u64,
    /// Staging directory for rendered files; defaults to the system temp dir.
    pub work_dir: Option<Utf8PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application: ApplicationSettings::default(),
            database: DatabaseSettings::default(),
            sources: SourceSettings::default(),
            command_timeout_secs: 900,
            work_dir: None,
        }
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ProvisionError> {
    let url = Url::parse(value)
        .map_err(|e| ProvisionError::Validation(format!("{} '{}' is not a valid URL: {}", field, value, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProvisionError::Validation(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }
    Ok(())
}

fn validate_file_name(field: &str, value: &str) -> Result<(), ProvisionError> {
    // Interpolated unquoted into shell command lines, so only plain names pass.
    if FILE_NAME.is_match(value) && value != "." && value != ".." {
        Ok(())
    } else {
        Err(ProvisionError::Validation(format!(
            "{} '{}' may only contain letters, digits, '.', '_' and '-'",
            field, value
        )))
    }
}

fn validate_identifier(field: &str, value: &str) -> Result<(), ProvisionError> {
    if SQL_IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(ProvisionError::Validation(format!(
            "{} '{}' may only contain letters, digits and underscores",
            field, value
        )))
    }
}

impl Settings {
    /// The per-command time limit.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// The staging directory for rendered files.
    pub fn work_dir(&self) -> Result<Utf8PathBuf, ProvisionError> {
        match &self.work_dir {
            Some(dir) => Ok(dir.clone()),
            None => Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|p| {
                ProvisionError::Validation(format!(
                    "temporary directory is not valid UTF-8: {}",
                    p.display()
                ))
            }),
        }
    }

    /// Checks all values for consistency.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        validate_url("application.repository", &self.application.repository)?;
        validate_url("sources.composer_installer", &self.sources.composer_installer)?;
        if let Some(node_setup) = &self.sources.node_setup {
            validate_url("sources.node_setup", node_setup)?;
        }
        validate_file_name("application.directory", &self.application.directory)?;
        validate_file_name("application.worker_log", &self.application.worker_log)?;
        validate_identifier("database.name", &self.database.name)?;
        validate_identifier("database.user", &self.database.user)?;
        if !(1..=MAX_COMMAND_TIMEOUT_SECS).contains(&self.command_timeout_secs) {
            return Err(ProvisionError::Validation(format!(
                "command_timeout_secs must be between 1 and {}",
                MAX_COMMAND_TIMEOUT_SECS
            )));
        }
        Ok(())
    }
}

/// Loads settings from a YAML file.
pub fn load_settings(path: &Utf8Path) -> Result<Settings, ProvisionError> {
    let file = File::open(path).map_err(|e| ProvisionError::io(path.as_str(), e))?;
    let reader = BufReader::new(file);
    let settings: Settings = serde_yaml::from_reader(reader)
        .map_err(|e| ProvisionError::Config(format!("failed to parse {}: {}", path, e)))?;
    debug!("loaded settings from {}: {:?}", path, settings);
    Ok(settings)
}

/// Loads settings from `path` if given, otherwise returns the defaults; then validates.
pub fn resolve_settings(path: Option<&Utf8Path>) -> Result<Settings, ProvisionError> {
    let settings = match path {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.command_timeout(), Duration::from_secs(900));
        assert_eq!(settings.application.directory, "logic");
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let settings: Settings =
            serde_yaml::from_str("database:\n  name: logic_prod\ncommand_timeout_secs: 60\n").unwrap();
        assert_eq!(settings.database.name, "logic_prod");
        assert_eq!(settings.database.user, "logic");
        assert_eq!(settings.command_timeout_secs, 60);
        assert_eq!(settings.application, ApplicationSettings::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Settings, _> = serde_yaml::from_str("databse:\n  name: x\n");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_bad_identifier() {
        let mut settings = Settings::default();
        settings.database.user = "logic'; DROP".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("database.user"));
    }

    #[test]
    fn rejects_non_http_url() {
        let mut settings = Settings::default();
        settings.sources.composer_installer = "ftp://example.com/installer".to_string();
        assert!(settings.validate().is_err());
        settings.sources.composer_installer = "not a url".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_nested_directory() {
        let mut settings = Settings::default();
        settings.application.directory = "../logic".to_string();
        assert!(settings.validate().is_err());
        settings.application.directory = "apps/logic".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_shell_metacharacters_in_names() {
        for name in ["a;touch x", "my app", "logic$(id)", "`id`", ".", "..", ""] {
            let mut settings = Settings::default();
            settings.application.directory = name.to_string();
            assert!(settings.validate().is_err(), "directory {:?} was accepted", name);

            let mut settings = Settings::default();
            settings.application.worker_log = name.to_string();
            assert!(settings.validate().is_err(), "worker_log {:?} was accepted", name);
        }
        let mut settings = Settings::default();
        settings.application.directory = "logic-2.x_prod".to_string();
        settings.validate().unwrap();
    }

    #[test]
    fn timeout_must_be_within_bounds() {
        for secs in [0, MAX_COMMAND_TIMEOUT_SECS + 1, u64::MAX] {
            let settings = Settings {
                command_timeout_secs: secs,
                ..Settings::default()
            };
            assert!(settings.validate().is_err(), "{} was accepted", secs);
        }
        let settings = Settings {
            command_timeout_secs: MAX_COMMAND_TIMEOUT_SECS,
            ..Settings::default()
        };
        settings.validate().unwrap();
    }

    #[test]
    fn explicit_work_dir_is_used() {
        let settings = Settings {
            work_dir: Some(Utf8PathBuf::from("/var/tmp/installer")),
            ..Settings::default()
        };
        assert_eq!(settings.work_dir().unwrap(), "/var/tmp/installer");
    }
}
