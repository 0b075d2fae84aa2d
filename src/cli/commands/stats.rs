//! Implementation of the `autocheck stats` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, percent, table, CommandOutput};
use crate::domain::models::{Config, Strategy};
use crate::infrastructure::runtime::open_selector;
use crate::services::supervisor::EXIT_OK;
use crate::services::SelectorStatistics;

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Number of most recent attempts to summarize
    #[arg(short = 'n', long, default_value = "100")]
    pub window: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsOutput {
    pub statistics: SelectorStatistics,
    pub best_strategy: Option<Strategy>,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let stats = &self.statistics;
        if stats.total_attempts == 0 {
            return format!("No attempts recorded in the last {} entries.", stats.window);
        }

        let mut strategies = table(&["Strategy", "Attempts", "Successes", "Success rate", "Mean latency", "Weight"]);
        for row in &stats.strategies {
            strategies.add_row(vec![
                row.strategy.to_string(),
                row.attempts.to_string(),
                row.successes.to_string(),
                percent(row.success_rate),
                format!("{:.2}s", row.mean_latency_seconds),
                format!("{:.3}", row.weight),
            ]);
        }

        let mut lines = vec![
            format!(
                "Last {} attempts: {} successful ({})",
                stats.total_attempts,
                stats.total_successes,
                percent(stats.success_rate)
            ),
            strategies.to_string(),
        ];
        if let Some(best) = self.best_strategy {
            lines.push(format!("Best strategy: {best}"));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: StatsArgs, config: &Config, json_mode: bool) -> Result<i32> {
    let selector = open_selector(&config.learning, config.learning.strategies.clone());
    let result = StatsOutput {
        statistics: selector.statistics(args.window),
        best_strategy: selector.best_strategy(),
    };
    output(&result, json_mode);
    Ok(EXIT_OK)
}
