//! Port for decrypting stored secrets.
//!
//! Encryption at rest is managed outside this crate; the checker only needs
//! to read what was stored.

use crate::domain::errors::DomainResult;

pub trait SecretCipher: Send + Sync {
    fn decrypt(&self, blob: &str) -> DomainResult<String>;
}

/// Cipher for stores that keep secrets in plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCipher;

impl SecretCipher for PlaintextCipher {
    fn decrypt(&self, blob: &str) -> DomainResult<String> {
        Ok(blob.to_string())
    }
}
