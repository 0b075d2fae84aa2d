//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that adapters implement:
//! - OwnerRepository / ResourceRepository / SettingsRepository: data store access
//! - ResourceResolver: resources for one (owner, strategy)
//! - VerificationBackend: one verification method
//! - NotificationTransport: outbound chat messages
//! - SecretCipher: decryption of stored secrets

pub mod notification_transport;
pub mod owner_repository;
pub mod resource_repository;
pub mod resource_resolver;
pub mod secret_cipher;
pub mod settings_repository;
pub mod verification_backend;

pub use notification_transport::{NotificationTransport, TransportError};
pub use owner_repository::OwnerRepository;
pub use resource_repository::{ProxyPenalty, ResourceRepository};
pub use resource_resolver::{Resolution, ResourceResolver};
pub use secret_cipher::{PlaintextCipher, SecretCipher};
pub use settings_repository::{SettingsRepository, AUTO_CHECK_INTERVAL_KEY};
pub use verification_backend::{BackendRegistry, VerificationBackend};
