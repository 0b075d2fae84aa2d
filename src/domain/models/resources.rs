//! Owner resources: API credentials, interactive sessions and proxies.
//!
//! Stored records carry encrypted secrets. The `Resolved*` types hold the
//! decrypted material handed to a backend for one attempt; their `Debug`
//! output never includes secrets.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::owner::OwnerId;
use super::strategy::Strategy;

pub type ResourceId = i64;

/// Stored API credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredential {
    pub id: ResourceId,
    pub owner_id: OwnerId,
    pub encrypted_key: String,
    pub working: bool,
    /// Requests made on `rotated_at`'s UTC day.
    pub request_count: u32,
    pub rotated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiCredential {
    /// Requests counted against today's quota; a counter from another day is stale.
    pub fn requests_today(&self, now: DateTime<Utc>) -> u32 {
        match self.rotated_at {
            Some(at) if at.date_naive() == now.date_naive() => self.request_count,
            _ => 0,
        }
    }

    pub fn is_usable(&self, daily_limit: u32, now: DateTime<Utc>) -> bool {
        self.working && self.requests_today(now) < daily_limit
    }
}

/// Stored logged-in browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveSession {
    pub id: ResourceId,
    pub owner_id: OwnerId,
    pub account_handle: String,
    pub encrypted_cookies: String,
    pub encrypted_password: Option<String>,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InteractiveSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "socks5" => Ok(Self::Socks5),
            other => Err(format!("unsupported proxy scheme: {other}")),
        }
    }
}

pub const BEST_PROXY_PRIORITY: u8 = 1;
pub const WORST_PROXY_PRIORITY: u8 = 10;

/// Stored outbound proxy with its health counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub id: ResourceId,
    pub owner_id: OwnerId,
    pub scheme: ProxyScheme,
    /// `host:port`
    pub host: String,
    pub username: Option<String>,
    pub encrypted_password: Option<String>,
    /// 1 is best, 10 is worst.
    pub priority: u8,
    pub active: bool,
    pub used_count: u32,
    pub success_count: u32,
    pub fail_streak: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ProxyEndpoint {
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub fn success_rate(&self) -> f64 {
        if self.used_count == 0 {
            0.0
        } else {
            f64::from(self.success_count) / f64::from(self.used_count)
        }
    }
}

/// Everything stored for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerResources {
    pub api_credentials: Vec<ApiCredential>,
    pub sessions: Vec<InteractiveSession>,
    pub proxies: Vec<ProxyEndpoint>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub id: ResourceId,
    pub key: String,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub id: ResourceId,
    pub account_handle: String,
    pub cookies: String,
    pub password: Option<String>,
}

impl fmt::Debug for ResolvedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSession")
            .field("id", &self.id)
            .field("account_handle", &self.account_handle)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedProxy {
    pub id: ResourceId,
    pub scheme: ProxyScheme,
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ResolvedProxy {
    /// `scheme://[user:pass@]host:port`
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("{}://{user}:{pass}@{}", self.scheme.as_str(), self.host)
            }
            (Some(user), None) => format!("{}://{user}@{}", self.scheme.as_str(), self.host),
            _ => format!("{}://{}", self.scheme.as_str(), self.host),
        }
    }
}

impl fmt::Debug for ResolvedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProxy")
            .field("id", &self.id)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Decrypted resources for one (owner, strategy) attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBundle {
    pub owner_id: OwnerId,
    pub strategy: Strategy,
    pub credential: Option<ResolvedCredential>,
    pub session: Option<ResolvedSession>,
    pub proxy: Option<ResolvedProxy>,
}

impl ResourceBundle {
    pub const fn empty(owner_id: OwnerId, strategy: Strategy) -> Self {
        Self {
            owner_id,
            strategy,
            credential: None,
            session: None,
            proxy: None,
        }
    }

    pub const fn uses_proxy(&self) -> bool {
        self.proxy.is_some()
    }
}
