//! Service layer: the checking engine built on the domain ports.

pub mod check_worker;
pub mod fleet_scheduler;
pub mod notification_sink;
pub mod resource_resolver;
pub mod strategy_history;
pub mod strategy_selector;
pub mod supervisor;

pub use check_worker::{AttemptStep, HandleCheck, HandleResult, OwnerWorker, WorkerConfig, WorkerReport};
pub use fleet_scheduler::{FleetConfig, FleetScheduler, SchedulerState, ShutdownReport, TickReport};
pub use notification_sink::{DeliveryStatus, NotificationSink, SinkConfig, SinkStats};
pub use resource_resolver::{ResolverConfig, StoreResourceResolver};
pub use strategy_history::{HistoryConfig, StrategyHistory};
pub use strategy_selector::{
    AdaptiveSelector, SelectorConfig, SelectorStatistics, StrategyStats, WeightTable,
};
pub use supervisor::{ExitDisposition, RestartGovernor, RestartPolicy, Supervisor};
