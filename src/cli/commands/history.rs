//! Implementation of the `autocheck history` command.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::domain::models::{AttemptRecord, Config};
use crate::infrastructure::runtime::open_selector;
use crate::services::supervisor::EXIT_OK;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommands,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// Print the most recent attempts
    Show {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Remove every record and reset weights
    Clear,
}

#[derive(Debug, Serialize)]
pub struct HistoryShowOutput {
    pub records: Vec<AttemptRecord>,
}

impl CommandOutput for HistoryShowOutput {
    fn to_human(&self) -> String {
        if self.records.is_empty() {
            return "History is empty.".to_string();
        }
        let mut records = table(&["Time", "Strategy", "Result", "Handle", "Owner", "Latency", "Error"]);
        for record in &self.records {
            records.add_row(vec![
                record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                record.strategy.clone(),
                if record.success { "ok" } else { "fail" }.to_string(),
                record.username.clone().unwrap_or_default(),
                record.user_id.map(|id| id.to_string()).unwrap_or_default(),
                format!("{:.2}s", record.response_time),
                truncate(record.error.as_deref().unwrap_or(""), 40),
            ]);
        }
        records.to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryClearOutput {
    pub removed: usize,
}

impl CommandOutput for HistoryClearOutput {
    fn to_human(&self) -> String {
        format!("Removed {} record(s), weights reset", self.removed)
    }
}

pub async fn execute(args: HistoryArgs, config: &Config, json_mode: bool) -> Result<i32> {
    let selector = open_selector(&config.learning, config.learning.strategies.clone());
    match args.command {
        HistoryCommands::Show { limit } => {
            let records = selector.history().snapshot(limit);
            output(&HistoryShowOutput { records }, json_mode);
        }
        HistoryCommands::Clear => {
            let removed = selector.history().len();
            selector.clear_history();
            output(&HistoryClearOutput { removed }, json_mode);
        }
    }
    Ok(EXIT_OK)
}
