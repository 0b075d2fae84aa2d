//! Autocheck - periodic handle verification with adaptive strategy selection
//!
//! Owners register handles they are waiting on. On every tick the fleet
//! scheduler launches one worker per eligible owner; the worker checks each
//! pending handle with verification strategies picked by a learned,
//! exploration-aware selector, activates handles found to exist, and queues
//! a notification for the owner.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports the engine needs
//! - **Service Layer** (`services`): scheduler, worker, selector, history, sink, supervisor
//! - **Adapters** (`adapters`): SQLite store, in-memory store, backends, transports
//! - **Infrastructure Layer** (`infrastructure`): config, logging, project setup, wiring
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    AttemptRecord, CheckOutcome, Config, ErrorTag, Existence, Handle, Notification, Owner,
    ResourceBundle, Strategy,
};
pub use domain::ports::{
    NotificationTransport, OwnerRepository, ResourceRepository, SettingsRepository,
    VerificationBackend,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AdaptiveSelector, FleetScheduler, NotificationSink, OwnerWorker, StrategyHistory};
