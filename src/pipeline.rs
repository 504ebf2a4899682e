//! Provisioning pipeline.
//!
//! The pipeline is a fixed, linear sequence of [`Step`]s. Each step issues
//! shell commands (elevated where it touches the system) and renders
//! configuration files. The run is a fold over the step list that stops at
//! the first error: nothing is retried and nothing already applied is
//! rolled back.
//!
//! | Step | Reads | Writes |
//! |---|---|---|
//! | install-packages | distro, credential | |
//! | install-build-tools | credential | |
//! | install-runtime | distro, credential | |
//! | configure-database | credential | `generated_secrets["database"]` |
//! | fetch-application | home, hostname, database secret | |
//! | bootstrap-application | user, home, credential | |
//! | configure-web-server | distro, hostname, home, credential | |
//! | configure-supervisor | distro, user, home, credential | |
//! | configure-schedule | user, home | |

use camino::Utf8PathBuf;
use strum::{Display, EnumIter};
use tracing::{info, warn};

use crate::config::Settings;
use crate::context::{DATABASE_SECRET, InstallMode, ProvisioningContext};
use crate::envfile;
use crate::error::ProvisionError;
use crate::secret::{SECRET_LEN, generate_secret};
use crate::shell::Shell;
use crate::template::{self, Staging, TemplateKind, TemplateValues};

/// Where the dependency manager is installed.
pub const COMPOSER_PATH: &str = "/usr/local/bin/composer";

/// One unit of provisioning work, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Step {
    InstallPackages,
    InstallBuildTools,
    InstallRuntime,
    ConfigureDatabase,
    FetchApplication,
    BootstrapApplication,
    ConfigureWebServer,
    ConfigureSupervisor,
    ConfigureSchedule,
}

/// Progress of a run: the last state reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    NotStarted,
    PackagesInstalled,
    BuildToolsInstalled,
    RuntimeInstalled,
    DatabaseConfigured,
    ApplicationFetched,
    ApplicationBootstrapped,
    WebServerConfigured,
    SupervisorConfigured,
    ScheduleConfigured,
    Complete,
}

impl Step {
    /// The stage reached once this step succeeds.
    pub fn reaches(&self) -> Stage {
        match self {
            Self::InstallPackages => Stage::PackagesInstalled,
            Self::InstallBuildTools => Stage::BuildToolsInstalled,
            Self::InstallRuntime => Stage::RuntimeInstalled,
            Self::ConfigureDatabase => Stage::DatabaseConfigured,
            Self::FetchApplication => Stage::ApplicationFetched,
            Self::BootstrapApplication => Stage::ApplicationBootstrapped,
            Self::ConfigureWebServer => Stage::WebServerConfigured,
            Self::ConfigureSupervisor => Stage::SupervisorConfigured,
            Self::ConfigureSchedule => Stage::ScheduleConfigured,
        }
    }
}

const FRESH_SERVER_STEPS: &[Step] = &[
    Step::InstallPackages,
    Step::InstallBuildTools,
    Step::InstallRuntime,
    Step::ConfigureDatabase,
    Step::FetchApplication,
    Step::BootstrapApplication,
    Step::ConfigureWebServer,
    Step::ConfigureSupervisor,
    Step::ConfigureSchedule,
];

const APPLICATION_ONLY_STEPS: &[Step] = &[
    Step::FetchApplication,
    Step::BootstrapApplication,
    Step::ConfigureWebServer,
    Step::ConfigureSupervisor,
    Step::ConfigureSchedule,
];

/// The steps run for `mode`, in order.
pub fn steps_for(mode: InstallMode) -> &'static [Step] {
    match mode {
        InstallMode::FreshServer => FRESH_SERVER_STEPS,
        InstallMode::ApplicationOnly => APPLICATION_ONLY_STEPS,
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub completed: Vec<Step>,
    pub stage: Stage,
}

/// Runs the step sequence against one context.
pub struct Pipeline<'a> {
    shell: &'a Shell,
    settings: &'a Settings,
    staging: Staging,
    dry_run: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        shell: &'a Shell,
        settings: &'a Settings,
        work_dir: impl Into<Utf8PathBuf>,
        dry_run: bool,
    ) -> Self {
        Self {
            shell,
            settings,
            staging: Staging::new(work_dir, dry_run),
            dry_run,
        }
    }

    /// Runs every step for the context's install mode, stopping at the first failure.
    ///
    /// A failure is reported as [`ProvisionError::StepFailed`] naming the step.
    pub fn run(&self, ctx: &mut ProvisioningContext) -> Result<RunReport, ProvisionError> {
        let steps = steps_for(ctx.install_mode);
        info!(
            "starting {} installation with {} step(s) on {} {}",
            ctx.install_mode,
            steps.len(),
            ctx.os.distro,
            ctx.os.release
        );

        let start = RunReport {
            completed: Vec::with_capacity(steps.len()),
            stage: Stage::NotStarted,
        };
        let mut report = steps.iter().enumerate().try_fold(start, |mut report, (index, step)| {
            info!("running step {}/{}: {}", index + 1, steps.len(), step);
            self.run_step(*step, ctx)
                .map_err(|e| ProvisionError::StepFailed {
                    step: step.to_string(),
                    source: Box::new(e),
                })?;
            report.completed.push(*step);
            report.stage = step.reaches();
            Ok::<_, ProvisionError>(report)
        })?;

        report.stage = Stage::Complete;
        info!("installation completed successfully");
        Ok(report)
    }

    fn run_step(&self, step: Step, ctx: &mut ProvisioningContext) -> Result<(), ProvisionError> {
        match step {
            Step::InstallPackages => self.install_packages(ctx),
            Step::InstallBuildTools => self.install_build_tools(ctx),
            Step::InstallRuntime => self.install_runtime(ctx),
            Step::ConfigureDatabase => self.configure_database(ctx),
            Step::FetchApplication => self.fetch_application(ctx),
            Step::BootstrapApplication => self.bootstrap_application(ctx),
            Step::ConfigureWebServer => self.configure_web_server(ctx),
            Step::ConfigureSupervisor => self.configure_supervisor(ctx),
            Step::ConfigureSchedule => self.configure_schedule(ctx),
        }
    }

    fn app_dir(&self, ctx: &ProvisioningContext) -> Utf8PathBuf {
        ctx.home_dir.join(&self.settings.application.directory)
    }

    fn template_values(&self, ctx: &ProvisioningContext) -> TemplateValues {
        let flavor = ctx.distro().flavor;
        TemplateValues {
            hostname: ctx.hostname.clone(),
            user: ctx.invoking_user.clone(),
            app_dir: self.app_dir(ctx),
            program: self.settings.application.directory.clone(),
            php_socket: flavor.php_fpm_socket().to_string(),
            php_binary: flavor.php_binary().to_string(),
            worker_log: ctx.home_dir.join(&self.settings.application.worker_log),
        }
    }

    fn install_package(&self, ctx: &ProvisioningContext, package: &str) -> Result<(), ProvisionError> {
        info!("installing {}", package);
        let install = ctx.distro().flavor.install_command();
        self.shell
            .run_elevated(&format!("{} {}", install, package), ctx.credential())?;
        Ok(())
    }

    fn install_packages(&self, ctx: &ProvisioningContext) -> Result<(), ProvisionError> {
        for package in ctx.distro().packages {
            self.install_package(ctx, package)?;
        }
        Ok(())
    }

    /// Downloads and runs the Composer installer, then moves the binary onto the PATH.
    fn install_build_tools(&self, ctx: &ProvisioningContext) -> Result<(), ProvisionError> {
        let work_dir = self.staging.dir();
        info!("downloading composer installer");
        self.shell.run_in(
            work_dir,
            &format!(
                "curl -fsSL {} -o composer-setup.php && php composer-setup.php --quiet \
                && rm -f composer-setup.php",
                shell_words::quote(&self.settings.sources.composer_installer)
            ),
        )?;
        info!("moving composer to {}", COMPOSER_PATH);
        self.shell.run_elevated(
            &format!("mv {} {}", work_dir.join("composer.phar"), COMPOSER_PATH),
            ctx.credential(),
        )?;
        self.shell
            .run_elevated(&format!("chmod 755 {}", COMPOSER_PATH), ctx.credential())?;
        Ok(())
    }

    fn install_runtime(&self, ctx: &ProvisioningContext) -> Result<(), ProvisionError> {
        let setup_url = self
            .settings
            .sources
            .node_setup
            .as_deref()
            .unwrap_or(ctx.distro().flavor.node_setup_url());
        info!("running node setup from {}", setup_url);
        self.shell
            .run_elevated(
                &format!("curl -fsSL {} | bash -", shell_words::quote(setup_url)),
                ctx.credential(),
            )?;
        self.install_package(ctx, "nodejs")
    }

    /// Generates the database password and creates the database and its account.
    fn configure_database(&self, ctx: &mut ProvisioningContext) -> Result<(), ProvisionError> {
        let password = generate_secret(SECRET_LEN);
        ctx.generated_secrets
            .insert(DATABASE_SECRET.to_string(), password.clone());

        let db = &self.settings.database;
        info!("creating database {}", db.name);
        self.shell.run_elevated(
            &format!("mysql -Bne \"CREATE DATABASE IF NOT EXISTS {};\"", db.name),
            ctx.credential(),
        )?;
        info!("creating database user {}", db.user);
        self.shell.run_elevated_redacted(
            &format!(
                "mysql -Bne \"CREATE USER IF NOT EXISTS '{user}'@'localhost' IDENTIFIED BY '{password}'; \
                GRANT ALL ON {name}.* TO '{user}'@'localhost'; FLUSH PRIVILEGES;\"",
                user = db.user,
                password = password,
                name = db.name
            ),
            ctx.credential(),
            &password,
        )?;
        Ok(())
    }

    /// Clones the application and writes its `.env` from the shipped example.
    fn fetch_application(&self, ctx: &ProvisioningContext) -> Result<(), ProvisionError> {
        let app_dir = self.app_dir(ctx);
        info!("cloning {} into {}", self.settings.application.repository, app_dir);
        self.shell.run_in(
            &ctx.home_dir,
            &format!(
                "git clone {} {}",
                shell_words::quote(&self.settings.application.repository),
                self.settings.application.directory
            ),
        )?;

        let db = &self.settings.database;
        let mut fields = vec![
            ("DB_DATABASE", db.name.clone()),
            ("DB_USERNAME", db.user.clone()),
            ("APP_URL", format!("http://{}", ctx.hostname)),
        ];
        match ctx.database_secret() {
            Some(secret) => fields.push(("DB_PASSWORD", format!("\"{}\"", secret))),
            None => warn!("no database password was generated in this run; set DB_PASSWORD manually"),
        }

        let example = app_dir.join(".env.example");
        let active = app_dir.join(".env");
        if self.dry_run {
            info!("dry run: would copy {} to {} and set {} field(s)", example, active, fields.len());
            return Ok(());
        }
        envfile::activate(&example, &active)?;
        envfile::rewrite_file(&active, &fields)
    }

    /// Installs the application's dependencies, fixes permissions and runs its upgrade.
    fn bootstrap_application(&self, ctx: &ProvisioningContext) -> Result<(), ProvisionError> {
        let app_dir = self.app_dir(ctx);
        let user = &ctx.invoking_user;

        info!("installing PHP dependencies");
        self.shell.run_in(&app_dir, "composer install --no-interaction")?;
        info!("installing Node dependencies");
        self.shell.run_in(&app_dir, "npm install")?;
        self.shell.run_in(&app_dir, "php artisan key:generate --force")?;

        info!("updating permissions");
        for writable in ["bootstrap", "storage"] {
            self.shell.run_elevated(
                &format!("chown -R {user}:{user} {}", app_dir.join(writable)),
                ctx.credential(),
            )?;
        }
        for writable in ["storage", "bootstrap"] {
            self.shell.run_in(&app_dir, &format!("chmod -R 777 {}", writable))?;
        }

        info!("running application upgrade routine (this may take a minute)");
        self.shell.run_in(&app_dir, "php artisan logic:upgrade")?;
        Ok(())
    }

    fn configure_web_server(&self, ctx: &ProvisioningContext) -> Result<(), ProvisionError> {
        let flavor = ctx.distro().flavor;
        info!("removing default nginx site");
        self.shell.run_elevated(
            &format!("rm -rf {}", flavor.default_site_path()),
            ctx.credential(),
        )?;

        let site = template::render(TemplateKind::ReverseProxySite, &self.template_values(ctx));
        let destination = flavor.site_path(&self.settings.application.directory);
        info!("writing nginx site {}", destination);
        self.staging
            .install(self.shell, ctx.credential(), &site, &destination)?;

        info!("restarting nginx");
        self.shell
            .run_elevated(flavor.web_restart_command(), ctx.credential())?;
        Ok(())
    }

    fn configure_supervisor(&self, ctx: &ProvisioningContext) -> Result<(), ProvisionError> {
        let flavor = ctx.distro().flavor;
        let program = &self.settings.application.directory;
        self.install_package(ctx, "supervisor")?;

        let worker = template::render(TemplateKind::SupervisorWorker, &self.template_values(ctx));
        let destination = flavor.supervisor_conf_path(program);
        info!("writing supervisor program {}", destination);
        self.staging
            .install(self.shell, ctx.credential(), &worker, &destination)?;

        info!("starting queue workers");
        for action in ["reread".to_string(), "update".to_string(), format!("start {}:*", program)] {
            self.shell
                .run_elevated(&format!("supervisorctl {}", action), ctx.credential())?;
        }
        Ok(())
    }

    /// Replaces the invoking user's crontab with a per-minute scheduler entry.
    fn configure_schedule(&self, ctx: &ProvisioningContext) -> Result<(), ProvisionError> {
        info!("installing scheduler cron entry for {}", ctx.invoking_user);
        self.shell.run(&format!(
            "echo '* * * * * cd {} && php artisan schedule:run > /dev/null 2>&1' | crontab -u {} -",
            self.app_dir(ctx),
            ctx.invoking_user
        ))?;
        Ok(())
    }
}
