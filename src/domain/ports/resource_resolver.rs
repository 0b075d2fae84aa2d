//! Resolver port: turns an (owner, strategy) pair into a usable bundle.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CheckOutcome, ErrorTag, OwnerId, ResourceBundle, ResourceClass, Strategy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ready(ResourceBundle),
    /// A required class had no usable member. `reason` is the matching
    /// `missing_*` tag, or `decrypt_failed`.
    Missing { class: ResourceClass, reason: ErrorTag },
}

#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn resolve(&self, owner_id: OwnerId, strategy: Strategy) -> DomainResult<Resolution>;

    /// Feed an attempt's outcome back into the usage counters of the
    /// resources it used.
    async fn report_usage(&self, bundle: &ResourceBundle, outcome: &CheckOutcome) -> DomainResult<()>;
}
