//! Adapters for external systems.

pub mod backends;
pub mod log_transport;
pub mod memory;
pub mod sqlite;
pub mod telegram;

pub use log_transport::LogTransport;
pub use memory::InMemoryStore;
pub use telegram::{TelegramConfig, TelegramTransport};
