//! agent-converge - Declarative convergence for a build agent
//!
//! Entry point for the agent-converge application.

use agent_converge::cli::{Cli, Commands, ConfigCommands};
use agent_converge::config::{Config, LogFormat, LogOutput, LoggingConfig};
use agent_converge::error::exit_code;
use agent_converge::{AgentResource, ConvergeError};
use clap::Parser;
use serde::Serialize;
use std::future::Future;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(Cli::usage_exit_code(&e) as u8);
        }
    };

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let _ = init_logging(&cli, &LoggingConfig::default());
            if matches!(cli.command, Commands::Config(ConfigCommands::Validate)) {
                println!("✗ Configuration is invalid: {}", e);
            }
            tracing::error!(code = %e.code(), "{}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    if let Err(e) = init_logging(&cli, &config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(exit_code::GENERAL_ERROR as u8);
    }

    match run(&cli, &config) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(code = %e.code(), kind = ?e.kind(), "{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Initialize the tracing subscriber from the logging configuration.
///
/// `-v`/`-q` take precedence over `RUST_LOG`, which takes precedence over
/// the configured level.
fn init_logging(
    cli: &Cli,
    logging: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match cli.log_level_override() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str())),
    };

    let writer = match logging.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::File => {
            let path = logging
                .file_path
                .as_deref()
                .ok_or("logging.file_path is required when output is file")?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    match logging.format {
        LogFormat::Json => builder.json().try_init()?,
        LogFormat::Text => builder.try_init()?,
    }

    Ok(())
}

/// Main application logic. Returns the process exit code.
fn run(cli: &Cli, config: &Config) -> agent_converge::Result<i32> {
    match &cli.command {
        Commands::Get => cmd_get(config),
        Commands::Plan => cmd_plan(config),
        Commands::Set => cmd_set(config),
        Commands::Test => cmd_test(config),
        Commands::Config(subcmd) => cmd_config(config, subcmd),
    }
}

/// Handle the `get` command.
fn cmd_get(config: &Config) -> agent_converge::Result<i32> {
    let resource = AgentResource::from_config(config)?;
    let actual = block_on(resource.read(&config.agent))??;
    print_json(&actual)?;
    Ok(exit_code::SUCCESS)
}

/// Handle the `plan` command.
fn cmd_plan(config: &Config) -> agent_converge::Result<i32> {
    let resource = AgentResource::from_config(config)?;
    let plan = block_on(resource.plan(&config.agent))??;
    print_json(&plan)?;
    Ok(exit_code::SUCCESS)
}

/// Handle the `set` command.
fn cmd_set(config: &Config) -> agent_converge::Result<i32> {
    tracing::info!(
        agent = %config.agent.name,
        presence = %config.agent.presence,
        run_state = %config.agent.run_state,
        "Applying desired state"
    );

    let resource = AgentResource::from_config(config)?;
    let report = block_on(resource.apply(&config.agent))??;
    print_json(&report)?;
    Ok(exit_code::SUCCESS)
}

/// Handle the `test` command.
fn cmd_test(config: &Config) -> agent_converge::Result<i32> {
    #[derive(Serialize)]
    struct Compliance {
        compliant: bool,
    }

    let resource = AgentResource::from_config(config)?;
    let compliant = block_on(resource.is_compliant(&config.agent))??;
    print_json(&Compliance { compliant })?;

    Ok(if compliant {
        exit_code::SUCCESS
    } else {
        exit_code::NOT_COMPLIANT
    })
}

/// Handle the `config` subcommand.
fn cmd_config(config: &Config, subcmd: &ConfigCommands) -> agent_converge::Result<i32> {
    match subcmd {
        ConfigCommands::Validate => {
            println!("✓ Configuration is valid");
            tracing::debug!(?config, "Validated configuration");
        }
        ConfigCommands::Show => {
            let yaml = serde_yaml::to_string(config).map_err(|e| {
                ConvergeError::config_with_source("Failed to serialize configuration", e)
            })?;
            println!("{}", yaml);
        }
    }
    Ok(exit_code::SUCCESS)
}

/// Runs a future to completion on a fresh runtime.
fn block_on<F: Future>(future: F) -> agent_converge::Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        ConvergeError::backend_with_source("Failed to create async runtime".to_string(), e)
    })?;
    Ok(runtime.block_on(future))
}

fn print_json<T: Serialize>(value: &T) -> agent_converge::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
