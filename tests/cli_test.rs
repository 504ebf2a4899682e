//! Tests for command-line parsing.

use camino::Utf8Path;
use clap::Parser;
use logic_installer::cli::{Cli, Commands, LogLevel};

#[test]
fn no_arguments_runs_installation_with_defaults() {
    let cli = Cli::try_parse_from(["logic-installer"]).unwrap();
    assert!(cli.command.is_none());
    assert!(cli.install.config.is_none());
    assert_eq!(cli.install.log_level, LogLevel::Info);
    assert!(!cli.install.dry_run);
}

#[test]
fn install_flags_are_accepted_before_and_after_subcommand() {
    let cli = Cli::try_parse_from([
        "logic-installer",
        "-c",
        "/etc/logic-installer.yml",
        "install",
        "--dry-run",
        "--log-level",
        "debug",
    ])
    .unwrap();
    assert!(matches!(cli.command, Some(Commands::Install)));
    assert_eq!(
        cli.install.config.as_deref(),
        Some(Utf8Path::new("/etc/logic-installer.yml"))
    );
    assert_eq!(cli.install.log_level, LogLevel::Debug);
    assert!(cli.install.dry_run);
}

#[test]
fn rejects_unknown_log_level() {
    assert!(Cli::try_parse_from(["logic-installer", "--log-level", "verbose"]).is_err());
}
