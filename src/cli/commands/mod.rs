//! Subcommand implementations. Each `execute` returns the process exit code.

pub mod history;
pub mod init;
pub mod interval;
pub mod run;
pub mod stats;
pub mod supervise;
pub mod tick;
