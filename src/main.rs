//! Autocheck CLI entry point.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use autocheck::cli::commands::{history, init, interval, run, stats, supervise, tick};
use autocheck::cli::{exit_code_for, load_config, Cli, Commands};
use autocheck::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit_code_for(&err)
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    let _logger = LoggerImpl::init(&config.logging)?;

    match cli.command {
        Commands::Init(args) => init::execute(args, &config, cli.json).await,
        Commands::Run => run::execute(config).await,
        Commands::Tick => tick::execute(config, cli.json).await,
        Commands::Supervise => supervise::execute(&config, cli.config.map(Into::into)).await,
        Commands::Stats(args) => stats::execute(args, &config, cli.json).await,
        Commands::History(args) => history::execute(args, &config, cli.json).await,
        Commands::Interval(args) => interval::execute(args, &config, cli.json).await,
    }
}
