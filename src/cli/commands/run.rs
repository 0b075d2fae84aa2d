//! Implementation of the `autocheck run` command.

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::misconfigured;
use crate::domain::models::Config;
use crate::infrastructure::Runtime;
use crate::services::supervisor::{EXIT_INTERRUPTED, EXIT_OK};

/// Run until the first interrupt, then shut down gracefully. A second
/// interrupt during shutdown exits immediately with 130.
pub async fn execute(config: Config) -> Result<i32> {
    let runtime = Runtime::build(config).await.map_err(misconfigured)?;
    runtime.scheduler.start().await?;
    info!("Checker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");

    tokio::select! {
        report = runtime.scheduler.shutdown() => {
            let report = report?;
            info!(finished = report.finished, abandoned = report.abandoned, "Shutdown complete");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Second interrupt, exiting without waiting for workers");
            return Ok(EXIT_INTERRUPTED);
        }
    }

    runtime.pool.close().await;
    Ok(EXIT_OK)
}
