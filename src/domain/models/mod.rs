pub mod attempt;
pub mod config;
pub mod handle;
pub mod notification;
pub mod outcome;
pub mod owner;
pub mod resources;
pub mod strategy;

pub use attempt::AttemptRecord;
pub use config::{
    BackendsConfig, Config, DatabaseConfig, HttpProbeConfig, LearningConfig, LoggingConfig,
    NotificationsConfig, ResourcesConfig, SchedulerConfig, SupervisorConfig,
};
pub use handle::{normalize_handle, Handle, HandleId};
pub use notification::{Notification, NotificationKind};
pub use outcome::{CheckOutcome, ErrorCategory, ErrorTag, Existence};
pub use owner::{
    clamp_interval_minutes, CheckMode, Owner, OwnerId, DEFAULT_CHECK_INTERVAL_MINUTES,
    MAX_CHECK_INTERVAL_MINUTES, MIN_CHECK_INTERVAL_MINUTES,
};
pub use resources::{
    ApiCredential, InteractiveSession, OwnerResources, ProxyEndpoint, ProxyScheme,
    ResolvedCredential, ResolvedProxy, ResolvedSession, ResourceBundle, ResourceId,
};
pub use strategy::{ResourceClass, Strategy};
