pub mod cli;
pub mod config;
pub mod context;
pub mod distro;
pub mod envfile;
pub mod error;
pub mod executor;
pub mod intake;
pub mod pipeline;
pub mod privilege;
pub mod scanner;
pub mod secret;
pub mod shell;
pub mod template;

pub use error::ProvisionError;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::CommandFactory;
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::executor::{CommandExecutor, RealCommandExecutor};
use crate::intake::Console;
use crate::pipeline::{Pipeline, RunReport};
use crate::shell::Shell;

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Runs intake and then the pipeline.
///
/// `query` serves intake's read-only commands (`whoami`, `lsb_release`,
/// the password check) and always really executes; `executor` serves the
/// pipeline and is the one that honours dry-run.
pub fn run_install(
    opts: &cli::InstallArgs,
    console: &mut dyn Console,
    query: Arc<dyn CommandExecutor>,
    executor: Arc<dyn CommandExecutor>,
) -> Result<RunReport> {
    let settings = config::resolve_settings(opts.config.as_deref())
        .context("failed to load installer settings")?;

    let query_shell = Shell::new(query).with_timeout(settings.command_timeout());
    let mut ctx = intake::run(&query_shell, console, env!("CARGO_PKG_VERSION"))?;

    let shell = Shell::new(executor).with_timeout(settings.command_timeout());
    let work_dir = settings.work_dir()?;
    let pipeline = Pipeline::new(&shell, &settings, work_dir, opts.dry_run);
    let report = pipeline.run(&mut ctx).context("installation aborted")?;

    console.notice(&format!(
        "Installation complete. Visit http://{} to finish setting up Logic.",
        ctx.hostname
    ));
    info!("reached stage {} after {} step(s)", report.stage, report.completed.len());
    Ok(report)
}

/// Runs the interactive installation against the real system.
pub fn run_install_interactive(opts: &cli::InstallArgs) -> Result<RunReport> {
    let mut console = intake::DialoguerConsole::new();
    let query: Arc<dyn CommandExecutor> = Arc::new(RealCommandExecutor { dry_run: false });
    let executor: Arc<dyn CommandExecutor> = Arc::new(RealCommandExecutor {
        dry_run: opts.dry_run,
    });
    run_install(opts, &mut console, query, executor)
}

/// Writes shell completions for `shell` to stdout.
pub fn run_completions(opts: &cli::CompletionsArgs) -> Result<()> {
    let mut command = cli::Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(opts.shell, &mut command, name, &mut io::stdout());
    Ok(())
}
