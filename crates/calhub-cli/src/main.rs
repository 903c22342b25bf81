//! calhub CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use calhub_cli::cli::{Cli, Command};
use calhub_cli::commands;
use calhub_cli::error::CliResult;
use calhub_core::{LogFormat, TracingConfig, init_tracing};
use calhub_server::HubConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    let format: LogFormat = cli.log_format.parse()?;
    init_tracing(TracingConfig::cli(cli.debug).with_format(format))?;
    Ok(())
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = HubConfig::load(cli.config.as_deref())?;
    let config_path = cli.config.clone().unwrap_or_else(HubConfig::default_path);

    match cli.command {
        Command::Feed {
            slug,
            format,
            output,
        } => commands::feed::run(&config, &slug, format, output.as_deref()).await,
        Command::Check => commands::check::run(&config, &config_path),
        Command::Warm { watch } => commands::warm::run(&config, watch).await,
    }
}
