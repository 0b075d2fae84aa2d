//! Verification backend adapters.

pub mod blocking;
pub mod http_probe;
pub mod scripted;

pub use blocking::BlockingBackend;
pub use http_probe::HttpProbeBackend;
pub use scripted::{Scripted, ScriptedBackend};
