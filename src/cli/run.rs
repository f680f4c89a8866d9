//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, installs tracing,
//! creates the tokio runtime, dispatches to the command and reports every
//! error itself. main.rs only maps the returned code to the process exit.

use clap::Parser;

use super::args::{Cli, Commands};
use super::commands;

use ssdlc_config::{CliArgs, Config};
use ssdlc_utils::error::{ConfigError, LlmError, SsdlcError, WorkflowError};
use ssdlc_utils::exit_codes::ExitCode;
use ssdlc_utils::logging::init_tracing;
use ssdlc_utils::redaction::redact_error_message;

pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let cli_args = cli_args_from(&cli);

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            let err = SsdlcError::from(err);
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    if let Err(e) = init_tracing(config.logging.verbose) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Chat { .. } => commands::execute_chat_command(&config).await,
            Commands::Status { json, .. } => commands::execute_status_command(&config, json),
            Commands::Config => commands::execute_config_command(&config),
        }
    });

    // A blocked stdin reader would otherwise keep the process alive.
    rt.shutdown_background();

    result.map_err(|error| report(&error))
}

pub(crate) fn cli_args_from(cli: &Cli) -> CliArgs {
    let mut args = CliArgs {
        config_path: cli.config.clone(),
        model: cli.model.clone(),
        max_attempts: cli.max_attempts,
        verbose: cli.verbose.then_some(true),
        ..CliArgs::default()
    };

    match &cli.command {
        Commands::Chat {
            dry_run,
            output_dir,
            step_mode,
            escalation,
        } => {
            args.dry_run = *dry_run;
            args.output_dir = output_dir.clone();
            args.step_mode = step_mode.clone();
            args.escalation = escalation.clone();
        }
        Commands::Status { output_dir, .. } => {
            args.output_dir = output_dir.clone();
        }
        Commands::Config => {}
    }
    args
}

/// Print `error` for the user and pick the exit code.
fn report(error: &anyhow::Error) -> ExitCode {
    if let Some(err) = error.downcast_ref::<SsdlcError>() {
        eprintln!("{}", err.display_for_user());
        return err.to_exit_code();
    }

    let typed = error
        .downcast_ref::<WorkflowError>()
        .cloned()
        .map(SsdlcError::from)
        .or_else(|| error.downcast_ref::<LlmError>().cloned().map(SsdlcError::from));
    if let Some(err) = typed {
        eprintln!("{}", err.display_for_user());
        return err.to_exit_code();
    }
    if let Some(err) = error.downcast_ref::<ConfigError>() {
        eprintln!("✗ Configuration error: {err}");
        return ExitCode::CLI_ARGS;
    }

    eprintln!("✗ Unexpected error: {}", redact_error_message(&format!("{error:#}")));
    eprintln!("\n  General troubleshooting:");
    eprintln!("    - Run with --verbose for more detailed output");
    eprintln!("    - Check that the output directory is writable");
    ExitCode::INTERNAL
}
