//! Command-line interface definition for agent-converge.
//!
//! This module defines the CLI structure using clap derive macros,
//! including all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::exit_code;

/// agent-converge - Declarative convergence for a build agent
///
/// Reads the desired state from the `agent` section of the configuration
/// file and inspects, plans or applies it on this host.
#[derive(Debug, Parser)]
#[command(name = "agent-converge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "AGENT_CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level forced by `-v`/`-q`, if any.
    ///
    /// Without either flag the configured level applies.
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("error");
        }

        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }

    /// Exit code for an argument parsing outcome.
    ///
    /// `--help` and `--version` surface as errors from clap but succeed.
    pub fn usage_exit_code(err: &clap::Error) -> i32 {
        if err.use_stderr() {
            exit_code::CLI_ERROR
        } else {
            exit_code::SUCCESS
        }
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the actual state of the agent as JSON
    Get,

    /// Print the actions `set` would take, without taking them
    Plan,

    /// Converge the agent to the desired state
    Set,

    /// Check whether the agent is in the desired state
    Test,

    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration file
    Validate,

    /// Show the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug() {
        // Verify CLI can be constructed
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resource_commands() {
        assert!(matches!(
            Cli::parse_from(["agent-converge", "get"]).command,
            Commands::Get
        ));
        assert!(matches!(
            Cli::parse_from(["agent-converge", "plan"]).command,
            Commands::Plan
        ));
        assert!(matches!(
            Cli::parse_from(["agent-converge", "set"]).command,
            Commands::Set
        ));
        assert!(matches!(
            Cli::parse_from(["agent-converge", "test"]).command,
            Commands::Test
        ));
    }

    #[test]
    fn test_config_validate() {
        let cli = Cli::parse_from(["agent-converge", "config", "validate"]);

        match cli.command {
            Commands::Config(ConfigCommands::Validate) => {}
            _ => panic!("Expected Config Validate command"),
        }
    }

    #[test]
    fn test_config_show() {
        let cli = Cli::parse_from(["agent-converge", "config", "show"]);

        match cli.command {
            Commands::Config(ConfigCommands::Show) => {}
            _ => panic!("Expected Config Show command"),
        }
    }

    #[test]
    fn test_global_config_option() {
        let cli = Cli::parse_from(["agent-converge", "set", "-c", "/custom/config.yaml"]);

        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.yaml")));
    }

    #[test]
    fn test_verbose_levels() {
        let cli = Cli::parse_from(["agent-converge", "get"]);
        assert_eq!(cli.log_level_override(), None);

        let cli = Cli::parse_from(["agent-converge", "-v", "get"]);
        assert_eq!(cli.log_level_override(), Some("debug"));

        let cli = Cli::parse_from(["agent-converge", "-vvv", "get"]);
        assert_eq!(cli.log_level_override(), Some("trace"));
    }

    #[test]
    fn test_quiet_mode() {
        let cli = Cli::parse_from(["agent-converge", "-q", "test"]);
        assert_eq!(cli.log_level_override(), Some("error"));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let err = Cli::try_parse_from(["agent-converge", "-q", "-v", "get"]).unwrap_err();
        assert_eq!(Cli::usage_exit_code(&err), exit_code::CLI_ERROR);
    }

    #[test]
    fn test_usage_error_exit_code() {
        let err = Cli::try_parse_from(["agent-converge", "--bogus", "get"]).unwrap_err();
        assert_eq!(Cli::usage_exit_code(&err), 64);

        let err = Cli::try_parse_from(["agent-converge"]).unwrap_err();
        assert_eq!(Cli::usage_exit_code(&err), 64);

        let err = Cli::try_parse_from(["agent-converge", "restart"]).unwrap_err();
        assert_eq!(Cli::usage_exit_code(&err), 64);
    }

    #[test]
    fn test_help_and_version_exit_cleanly() {
        let err = Cli::try_parse_from(["agent-converge", "--help"]).unwrap_err();
        assert_eq!(Cli::usage_exit_code(&err), exit_code::SUCCESS);

        let err = Cli::try_parse_from(["agent-converge", "--version"]).unwrap_err();
        assert_eq!(Cli::usage_exit_code(&err), exit_code::SUCCESS);
    }
}
