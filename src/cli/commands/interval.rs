//! Implementation of the `autocheck interval` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteSettingsRepository};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{clamp_interval_minutes, Config};
use crate::domain::ports::{SettingsRepository, AUTO_CHECK_INTERVAL_KEY};
use crate::services::supervisor::EXIT_OK;

#[derive(Args, Debug)]
pub struct IntervalArgs {
    /// New interval in minutes, clamped to 1-1440
    pub minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct IntervalOutput {
    pub interval_minutes: u32,
    /// `setting` when read from system settings, `config` for the fallback.
    pub source: &'static str,
    pub updated: bool,
}

impl CommandOutput for IntervalOutput {
    fn to_human(&self) -> String {
        let verb = if self.updated { "set to" } else { "is" };
        format!("Check interval {verb} {} minute(s) ({})", self.interval_minutes, self.source)
    }
}

pub async fn execute(args: IntervalArgs, config: &Config, json_mode: bool) -> Result<i32> {
    let pool = initialize_database(
        &database_url(&config.database.path),
        Some(PoolConfig::from(&config.database)),
    )
    .await
    .context("Failed to initialize database")?;
    let settings = SqliteSettingsRepository::new(pool.clone());

    let result = match args.minutes {
        Some(minutes) => {
            let clamped = clamp_interval_minutes(minutes);
            settings
                .set_setting(AUTO_CHECK_INTERVAL_KEY, &clamped.to_string())
                .await
                .context("Failed to store interval")?;
            IntervalOutput {
                interval_minutes: clamped,
                source: "setting",
                updated: true,
            }
        }
        None => {
            let stored = settings
                .get_setting(AUTO_CHECK_INTERVAL_KEY)
                .await
                .context("Failed to read interval")?
                .and_then(|raw| raw.trim().parse::<i64>().ok());
            match stored {
                Some(minutes) => IntervalOutput {
                    interval_minutes: clamp_interval_minutes(minutes),
                    source: "setting",
                    updated: false,
                },
                None => IntervalOutput {
                    interval_minutes: config.scheduler.interval_minutes,
                    source: "config",
                    updated: false,
                },
            }
        }
    };

    pool.close().await;
    output(&result, json_mode);
    Ok(EXIT_OK)
}
