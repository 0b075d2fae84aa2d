//! Implementation of the `autocheck init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::setup::{initialize_project, InitReport};
use crate::services::supervisor::EXIT_OK;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    #[serde(flatten)]
    pub report: InitReport,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let config_line = if report.config_written {
            format!("Wrote {}", report.config_file.display())
        } else {
            format!("Kept existing {} (use --force to overwrite)", report.config_file.display())
        };
        [
            config_line,
            format!("Database ready at {}", report.database_file.display()),
            format!("Artifacts go to {}", report.artifact_dir.display()),
        ]
        .join("\n")
    }
}

pub async fn execute(args: InitArgs, config: &Config, json_mode: bool) -> Result<i32> {
    let root = if args.path.is_absolute() {
        args.path
    } else {
        std::env::current_dir().context("Failed to get current directory")?.join(&args.path)
    };
    std::fs::create_dir_all(&root).context("Failed to create target directory")?;

    let report = initialize_project(&root, config, args.force).await?;
    output(&InitOutput { report }, json_mode);
    Ok(EXIT_OK)
}
