//! Infrastructure layer
//!
//! - Configuration management (figment)
//! - Logging (tracing-subscriber, tracing-appender)
//! - Project setup and runtime assembly

pub mod config;
pub mod logging;
pub mod runtime;
pub mod setup;

pub use runtime::Runtime;
