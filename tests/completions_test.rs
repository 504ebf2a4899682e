//! Tests for shell completion functionality.
//!
//! This module tests the completions subcommand, ensuring that:
//! - Completions can be parsed for all supported shells
//! - Generation produces output for every shell
//! - The binary writes completions to stdout

use anyhow::Result;
use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::{Shell, generate};
use logic_installer::cli::{Cli, Commands};

const BIN: &str = env!("CARGO_BIN_EXE_logic-installer");

/// Test parsing the completions command for all supported shells.
#[test]
fn test_completions_command_parsing() -> Result<()> {
    let shells = [
        ("bash", Shell::Bash),
        ("zsh", Shell::Zsh),
        ("fish", Shell::Fish),
        ("powershell", Shell::PowerShell),
        ("elvish", Shell::Elvish),
    ];

    for (shell_str, expected_shell) in shells {
        let args = Cli::parse_from(["logic-installer", "completions", shell_str]);
        match args.command {
            Some(Commands::Completions(opts)) => {
                assert_eq!(opts.shell, expected_shell, "Mismatched shell for '{}'", shell_str);
            }
            _ => panic!("Expected Completions command for shell '{}'", shell_str),
        }
    }

    Ok(())
}

#[test]
fn test_completions_generation() -> Result<()> {
    let mut cmd = Cli::command();
    let mut buffer = Vec::new();

    for shell in Shell::value_variants() {
        buffer.clear();
        generate(*shell, &mut cmd, "logic-installer", &mut buffer);
        assert!(!buffer.is_empty(), "Generated completion for {:?} was empty", shell);
    }

    Ok(())
}

#[test]
fn test_completion_contents() -> Result<()> {
    let mut cmd = Cli::command();

    let test_cases = [
        (Shell::Bash, &["logic-installer", "install", "completions", "--dry-run"] as &[_]),
        (Shell::Zsh, &["#compdef logic-installer", "install", "--config"]),
        (Shell::Fish, &["logic-installer", "install", "completions"]),
    ];

    for (shell, patterns) in test_cases {
        let mut buffer = Vec::new();
        generate(shell, &mut cmd, "logic-installer", &mut buffer);
        let output = String::from_utf8(buffer)?;

        for pattern in patterns {
            assert!(
                output.contains(pattern),
                "Pattern '{}' not found in {:?} completions",
                pattern,
                shell
            );
        }
    }

    Ok(())
}

/// Runs the built binary and checks the completion script on stdout.
#[test]
fn test_cli_completions_output() -> Result<()> {
    let output = std::process::Command::new(BIN)
        .args(["completions", "bash"])
        .output()?;

    assert!(output.status.success(), "completions command failed");
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("logic-installer"));
    assert!(stdout.contains("install"));

    Ok(())
}

#[test]
fn test_invalid_shell_rejected() {
    let result = Cli::try_parse_from(["logic-installer", "completions", "invalid-shell"]);
    assert!(result.is_err(), "Expected parsing to fail for invalid shell");
}
