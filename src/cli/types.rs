//! CLI type definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::commands::{history::HistoryArgs, init::InitArgs, interval::IntervalArgs, stats::StatsArgs};

#[derive(Parser, Debug)]
#[command(name = "autocheck")]
#[command(about = "Periodic handle verification with adaptive strategy selection", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file (defaults to autocheck.yaml + autocheck.local.yaml)
    #[arg(short, long, global = true, env = "AUTOCHECK_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default config file and create the database
    Init(InitArgs),

    /// Run the scheduler until interrupted
    Run,

    /// Run a single tick and wait for its workers
    Tick,

    /// Run the checker as a child process and restart it when it crashes
    Supervise,

    /// Show per-strategy statistics and weights
    Stats(StatsArgs),

    /// Inspect or clear the strategy history
    History(HistoryArgs),

    /// Show or change the check interval stored in system settings
    Interval(IntervalArgs),
}
