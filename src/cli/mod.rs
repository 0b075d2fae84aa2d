//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

use std::path::Path;

use anyhow::Result;
use thiserror::Error;

pub use types::{Cli, Commands};

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::supervisor::EXIT_NO_RESTART;

/// Startup failure that restarting will not fix.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Misconfigured(pub String);

/// Mark an error as misconfiguration so the process exits with code 2.
pub fn misconfigured(err: impl std::fmt::Display) -> anyhow::Error {
    Misconfigured(format!("{err:#}")).into()
}

/// Load config from `path`, or from the default locations.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let loaded = match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    loaded.map_err(misconfigured)
}

pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|e| e.is::<Misconfigured>()) {
        EXIT_NO_RESTART
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_misconfiguration_maps_to_no_restart() {
        let err = Err::<(), _>(misconfigured("bad interval"))
            .context("startup")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_NO_RESTART);
        assert_eq!(exit_code_for(&anyhow::anyhow!("network down")), 1);
    }

    #[test]
    fn test_missing_config_file_is_misconfiguration() {
        let err = load_config(Some(Path::new("/nonexistent/autocheck.yaml"))).unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_NO_RESTART);
    }
}
