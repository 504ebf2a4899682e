//! The provisioning context: everything intake decided and the pipeline derived.
//!
//! A single [`ProvisioningContext`] is built by intake, then handed by
//! mutable reference to the pipeline for the rest of the run. Fields are
//! only ever set or overwritten with a final value, never cleared.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use strum::Display;

use crate::distro::{DistroDescriptor, DistroId};
use crate::error::ProvisionError;
use crate::privilege::Credential;

/// Key under which the database password is stored in `generated_secrets`.
pub const DATABASE_SECRET: &str = "database";

/// What the operator asked to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum InstallMode {
    /// Provision OS packages, tooling and runtime, then the application.
    #[strum(serialize = "fresh server")]
    FreshServer,
    /// Only fetch, bootstrap and wire up the application.
    #[strum(serialize = "application only")]
    ApplicationOnly,
}

/// Operating system metadata as reported by `lsb_release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    pub distro: DistroId,
    pub release: String,
    pub codename: String,
    pub description: String,
}

/// Mutable record of the run.
#[derive(Debug, Clone)]
pub struct ProvisioningContext {
    /// Never `root`.
    pub invoking_user: String,
    /// The invoking user's home directory; the application is cloned here.
    pub home_dir: Utf8PathBuf,
    pub os: OsRelease,
    /// Used verbatim in generated configuration.
    pub hostname: String,
    pub install_mode: InstallMode,
    /// Absent means every elevated command fails with `MissingCredential`.
    pub privileged_credential: Option<Credential>,
    pub generated_secrets: HashMap<String, String>,
}

impl ProvisioningContext {
    /// Builds a validated context.
    ///
    /// Rejects `root`, an empty user, an empty hostname and an unsupported
    /// release.
    pub fn new(
        invoking_user: impl Into<String>,
        home_dir: impl Into<Utf8PathBuf>,
        os: OsRelease,
        hostname: impl Into<String>,
        install_mode: InstallMode,
        privileged_credential: Option<Credential>,
    ) -> Result<Self, ProvisionError> {
        let invoking_user = invoking_user.into();
        let hostname = hostname.into();

        if invoking_user.is_empty() {
            return Err(ProvisionError::Validation("invoking user must not be empty".to_string()));
        }
        if invoking_user == "root" {
            return Err(ProvisionError::RootUser);
        }
        if hostname.trim().is_empty() {
            return Err(ProvisionError::Validation("hostname must not be empty".to_string()));
        }
        if !os.distro.descriptor().is_supported(&os.release) {
            return Err(ProvisionError::UnsupportedRelease {
                distro: os.distro.to_string(),
                release: os.release,
            });
        }

        Ok(Self {
            invoking_user,
            home_dir: home_dir.into(),
            os,
            hostname,
            install_mode,
            privileged_credential,
            generated_secrets: HashMap::new(),
        })
    }

    /// The descriptor of the detected distribution.
    pub fn distro(&self) -> &'static DistroDescriptor {
        self.os.distro.descriptor()
    }

    /// The conventional home directory for `user`.
    pub fn default_home_dir(user: &str) -> Utf8PathBuf {
        Utf8Path::new("/home").join(user)
    }

    /// The credential to elevate with, if one was supplied.
    pub fn credential(&self) -> Option<&Credential> {
        self.privileged_credential.as_ref()
    }

    /// The generated database password, if the database step has run.
    pub fn database_secret(&self) -> Option<&str> {
        self.generated_secrets.get(DATABASE_SECRET).map(String::as_str)
    }
}
