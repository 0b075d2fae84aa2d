//! Implementation of the `autocheck tick` command: one pass over the fleet.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::cli::misconfigured;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::Runtime;
use crate::services::supervisor::EXIT_OK;
use crate::services::{SinkStats, TickReport, WorkerReport};

#[derive(Debug, Serialize)]
pub struct TickOutput {
    pub tick: TickReport,
    pub workers: Vec<WorkerReport>,
    pub notifications: SinkStats,
}

impl CommandOutput for TickOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Tick {}: {} eligible, {} launched, {} deferred (interval {} min)",
            self.tick.tick,
            self.tick.eligible,
            self.tick.launched.len(),
            self.tick.deferred.len(),
            self.tick.interval_minutes,
        )];

        if !self.workers.is_empty() {
            let mut workers = table(&["Owner", "Checked", "Found", "Not found", "Failed", "Skipped", "Invalid", "Time"]);
            for report in &self.workers {
                workers.add_row(vec![
                    report.owner_id.to_string(),
                    report.checked.to_string(),
                    report.found.to_string(),
                    report.not_found.to_string(),
                    report.failed.to_string(),
                    report.skipped.to_string(),
                    report.invalid.to_string(),
                    format!("{:.1}s", report.duration_ms as f64 / 1000.0),
                ]);
            }
            lines.push(workers.to_string());
        }

        lines.push(format!(
            "Notifications: {} delivered, {} failed, {} suppressed",
            self.notifications.delivered, self.notifications.failed, self.notifications.suppressed
        ));
        lines.join("\n")
    }
}

pub async fn execute(config: Config, json_mode: bool) -> Result<i32> {
    let grace = Duration::from_secs(config.scheduler.shutdown_grace_seconds);
    let runtime = Runtime::build(config).await.map_err(misconfigured)?;

    let tick = runtime.scheduler.tick().await?;
    let mut workers = runtime.scheduler.wait_idle().await;
    workers.sort_by_key(|r| r.owner_id);
    runtime.selector.flush().await;
    runtime.sink.shutdown(grace).await;
    runtime.pool.close().await;

    let result = TickOutput {
        tick,
        workers,
        notifications: runtime.sink.stats(),
    };
    output(&result, json_mode);
    Ok(EXIT_OK)
}
