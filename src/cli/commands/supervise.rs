//! Implementation of the `autocheck supervise` command.

use std::ffi::OsString;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::models::Config;
use crate::services::{RestartPolicy, Supervisor};

/// Relaunch `autocheck run` with the same config until it exits cleanly,
/// asks not to be restarted, or the supervisor is interrupted.
pub async fn execute(config: &Config, config_path: Option<OsString>) -> Result<i32> {
    let program = std::env::current_exe().context("Failed to locate current executable")?;
    let mut args: Vec<OsString> = Vec::new();
    if let Some(path) = config_path {
        args.push("--config".into());
        args.push(path);
    }
    args.push("run".into());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received by supervisor");
            on_interrupt.cancel();
        }
    });

    let mut supervisor = Supervisor::new(program, args, RestartPolicy::from(&config.supervisor));
    let code = supervisor.run(&cancel).await?;
    Ok(code)
}
