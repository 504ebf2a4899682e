//! Interactive intake.
//!
//! Collects everything the pipeline needs before it starts: the invoking
//! user (never root), the detected and supported operating system, the
//! target hostname, the install mode and, optionally, a verified sudo
//! password. The operator is reached through the [`Console`] trait so the
//! flow can be driven by a script in tests.

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password, Select};
use tracing::{info, warn};

use crate::context::{InstallMode, OsRelease, ProvisioningContext};
use crate::distro;
use crate::error::ProvisionError;
use crate::privilege::{self, Credential};
use crate::scanner::require_field;
use crate::shell::Shell;

/// How many times a rejected sudo password is asked for before giving up.
pub const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// The operator-facing side of intake.
pub trait Console {
    /// Shows an informational line.
    fn notice(&mut self, message: &str);

    /// Asks for the hostname the application will be served on. Must not be empty.
    fn ask_hostname(&mut self) -> Result<String>;

    /// Asks which install mode to use.
    fn choose_install_mode(&mut self) -> Result<InstallMode>;

    /// Asks for the sudo password. `None` means the operator declined to give one.
    fn ask_credential(&mut self, attempt: u32) -> Result<Option<Credential>>;
}

/// [`Console`] backed by `dialoguer` prompts on the terminal.
pub struct DialoguerConsole {
    theme: ColorfulTheme,
}

impl DialoguerConsole {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for DialoguerConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for DialoguerConsole {
    fn notice(&mut self, message: &str) {
        println!("{}", message);
    }

    fn ask_hostname(&mut self) -> Result<String> {
        let hostname: String = Input::with_theme(&self.theme)
            .with_prompt("Hostname this installation will be reached at")
            .validate_with(|input: &String| -> std::result::Result<(), &str> {
                if input.trim().is_empty() {
                    Err("hostname must not be empty")
                } else {
                    Ok(())
                }
            })
            .interact_text()
            .context("failed to read hostname")?;
        Ok(hostname.trim().to_string())
    }

    fn choose_install_mode(&mut self) -> Result<InstallMode> {
        let modes = [InstallMode::FreshServer, InstallMode::ApplicationOnly];
        let items = [
            "Fresh server (install system packages, then the application)",
            "Application only (system packages are already installed)",
        ];
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Installation method")
            .items(&items)
            .default(0)
            .interact()
            .context("failed to read installation method")?;
        Ok(modes[selection])
    }

    fn ask_credential(&mut self, attempt: u32) -> Result<Option<Credential>> {
        let prompt = if attempt == 1 {
            "Password for sudo (leave empty to skip)".to_string()
        } else {
            format!(
                "Password for sudo, attempt {}/{} (leave empty to skip)",
                attempt, MAX_CREDENTIAL_ATTEMPTS
            )
        };
        let password = Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .context("failed to read password")?;
        Ok((!password.is_empty()).then(|| Credential::new(password)))
    }
}

/// Returns the invoking user, rejecting root.
pub fn check_for_root(shell: &Shell) -> Result<String, ProvisionError> {
    let user = shell.run("whoami")?;
    info!("checking current user: [{}]", user);
    if user == "root" {
        return Err(ProvisionError::RootUser);
    }
    if user.is_empty() {
        return Err(ProvisionError::UndetectedField("current user".to_string()));
    }
    Ok(user)
}

/// Parses `lsb_release -a` output and checks the distribution and release are supported.
pub fn parse_os_release(output: &str) -> Result<OsRelease, ProvisionError> {
    let identifier = require_field(output, "Distributor ID:")?;
    let description = require_field(output, "Description:")?;
    let release = require_field(output, "Release:")?;
    let codename = require_field(output, "Codename:")?;

    let Some(descriptor) = distro::resolve(&identifier) else {
        return Err(ProvisionError::UnsupportedDistro(identifier));
    };
    if !descriptor.is_supported(&release) {
        return Err(ProvisionError::UnsupportedRelease {
            distro: identifier,
            release,
        });
    }

    Ok(OsRelease {
        distro: descriptor.id,
        release,
        codename,
        description,
    })
}

/// Detects the operating system and checks it is supported.
pub fn detect_os(shell: &Shell) -> Result<OsRelease, ProvisionError> {
    let output = shell.run("lsb_release -a")?;
    let os = parse_os_release(&output)?;
    info!("{} release {} ({}) is supported by this installer", os.distro, os.release, os.codename);
    Ok(os)
}

/// Asks for the sudo password until sudo accepts it, at most `max_attempts` times.
///
/// An empty answer returns `Ok(None)`: the run continues without a
/// credential and any elevated step will fail with `MissingCredential`.
pub fn acquire_credential(
    shell: &Shell,
    console: &mut dyn Console,
    max_attempts: u32,
) -> Result<Option<Credential>> {
    for attempt in 1..=max_attempts {
        let Some(credential) = console.ask_credential(attempt)? else {
            warn!("no sudo password given; privileged steps will fail");
            return Ok(None);
        };
        if privilege::validate_credential(shell.executor(), &credential, shell.timeout())? {
            return Ok(Some(credential));
        }
        console.notice("Sorry, that password was not accepted.");
    }
    Err(ProvisionError::InvalidCredential {
        attempts: max_attempts,
    }
    .into())
}

/// Runs the whole intake flow and returns a validated context.
///
/// `version` is shown in the banner.
pub fn run(shell: &Shell, console: &mut dyn Console, version: &str) -> Result<ProvisioningContext> {
    console.notice(&format!("Logic Installer v{}", version));
    console.notice(
        "This application will check and install any prerequisites on your server \
        to run Logic in your environment.",
    );

    let user = check_for_root(shell)?;
    let os = detect_os(shell)?;
    console.notice(&format!("{} Release {} is supported by this installer.", os.distro, os.release));

    let hostname = console.ask_hostname()?;
    let install_mode = console.choose_install_mode()?;
    let credential = acquire_credential(shell, console, MAX_CREDENTIAL_ATTEMPTS)?;

    let home_dir = ProvisioningContext::default_home_dir(&user);
    let ctx = ProvisioningContext::new(user, home_dir, os, hostname, install_mode, credential)?;
    Ok(ctx)
}
