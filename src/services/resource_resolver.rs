//! Resource resolution backed by a `ResourceRepository`.
//!
//! Picks one usable member per required class, decrypts it, and feeds
//! attempt results back into credential quotas and proxy health.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ApiCredential, CheckOutcome, ErrorCategory, ErrorTag, InteractiveSession, OwnerId,
    OwnerResources, ProxyEndpoint, ResolvedCredential, ResolvedProxy, ResolvedSession,
    ResourceBundle, ResourceClass, ResourcesConfig, Strategy,
};
use crate::domain::ports::{
    ProxyPenalty, Resolution, ResourceRepository, ResourceResolver, SecretCipher,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub api_daily_limit: u32,
    pub proxy_cooldown: Duration,
    pub proxy_failure_threshold: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::from(&ResourcesConfig::default())
    }
}

impl From<&ResourcesConfig> for ResolverConfig {
    fn from(config: &ResourcesConfig) -> Self {
        Self {
            api_daily_limit: config.api_daily_limit,
            proxy_cooldown: Duration::from_secs(config.proxy_cooldown_seconds),
            proxy_failure_threshold: config.proxy_failure_threshold,
        }
    }
}

pub struct StoreResourceResolver {
    repository: Arc<dyn ResourceRepository>,
    cipher: Arc<dyn SecretCipher>,
    config: ResolverConfig,
}

impl StoreResourceResolver {
    pub fn new(
        repository: Arc<dyn ResourceRepository>,
        cipher: Arc<dyn SecretCipher>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            repository,
            cipher,
            config,
        }
    }

    fn resolve_from(
        &self,
        owner_id: OwnerId,
        strategy: Strategy,
        resources: &OwnerResources,
        now: DateTime<Utc>,
    ) -> Resolution {
        let mut bundle = ResourceBundle::empty(owner_id, strategy);
        for &class in strategy.required_classes() {
            let missing = ErrorTag::missing(class);
            let resolved = match class {
                ResourceClass::ApiKey => self
                    .pick_credential(&resources.api_credentials, now)
                    .ok_or(missing)
                    .and_then(|c| self.decrypt_credential(c))
                    .map(|c| bundle.credential = Some(c)),
                ResourceClass::Session => pick_session(&resources.sessions, now)
                    .ok_or(missing)
                    .and_then(|s| self.decrypt_session(s))
                    .map(|s| bundle.session = Some(s)),
                ResourceClass::Proxy => pick_proxy(&resources.proxies, now)
                    .ok_or(missing)
                    .and_then(|p| self.decrypt_proxy(p))
                    .map(|p| bundle.proxy = Some(p)),
            };
            if let Err(reason) = resolved {
                return Resolution::Missing { class, reason };
            }
        }
        Resolution::Ready(bundle)
    }

    fn pick_credential<'a>(
        &self,
        credentials: &'a [ApiCredential],
        now: DateTime<Utc>,
    ) -> Option<&'a ApiCredential> {
        credentials
            .iter()
            .filter(|c| c.is_usable(self.config.api_daily_limit, now))
            .min_by_key(|c| (c.created_at, c.id))
    }

    fn decrypt_credential(&self, credential: &ApiCredential) -> Result<ResolvedCredential, ErrorTag> {
        let key = self.decrypt("api_credential", credential.id, &credential.encrypted_key)?;
        Ok(ResolvedCredential {
            id: credential.id,
            key,
        })
    }

    fn decrypt_session(&self, session: &InteractiveSession) -> Result<ResolvedSession, ErrorTag> {
        let cookies = self.decrypt("session", session.id, &session.encrypted_cookies)?;
        // The password is only a fallback for re-login; a bad one does not void the session.
        let password = session
            .encrypted_password
            .as_deref()
            .and_then(|blob| self.decrypt("session_password", session.id, blob).ok());
        Ok(ResolvedSession {
            id: session.id,
            account_handle: session.account_handle.clone(),
            cookies,
            password,
        })
    }

    fn decrypt_proxy(&self, proxy: &ProxyEndpoint) -> Result<ResolvedProxy, ErrorTag> {
        let password = proxy
            .encrypted_password
            .as_deref()
            .map(|blob| self.decrypt("proxy_password", proxy.id, blob))
            .transpose()?;
        Ok(ResolvedProxy {
            id: proxy.id,
            scheme: proxy.scheme,
            host: proxy.host.clone(),
            username: proxy.username.clone(),
            password,
        })
    }

    fn decrypt(&self, kind: &'static str, id: i64, blob: &str) -> Result<String, ErrorTag> {
        self.cipher.decrypt(blob).map_err(|e| {
            warn!(resource = kind, resource_id = id, error = %e, "Failed to decrypt stored secret");
            ErrorTag::DecryptFailed
        })
    }
}

fn pick_session(sessions: &[InteractiveSession], now: DateTime<Utc>) -> Option<&InteractiveSession> {
    sessions
        .iter()
        .filter(|s| s.active && !s.is_expired(now))
        .min_by_key(|s| (s.created_at, s.id))
}

/// Best proxy by priority, then success rate, then age. If every active
/// proxy is cooling down, the oldest active one is used anyway.
fn pick_proxy(proxies: &[ProxyEndpoint], now: DateTime<Utc>) -> Option<&ProxyEndpoint> {
    let ready = proxies
        .iter()
        .filter(|p| p.active && !p.in_cooldown(now))
        .min_by(|a, b| compare_proxies(a, b));
    ready.or_else(|| {
        proxies
            .iter()
            .filter(|p| p.active)
            .min_by_key(|p| (p.created_at, p.id))
    })
}

fn compare_proxies(a: &ProxyEndpoint, b: &ProxyEndpoint) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.success_rate().total_cmp(&a.success_rate()))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl ResourceResolver for StoreResourceResolver {
    async fn resolve(&self, owner_id: OwnerId, strategy: Strategy) -> DomainResult<Resolution> {
        let resources = self.repository.owner_resources(owner_id).await?;
        let resolution = self.resolve_from(owner_id, strategy, &resources, Utc::now());
        if let Resolution::Missing { class, reason } = &resolution {
            debug!(owner_id, %strategy, %class, %reason, "Required resource unavailable");
        }
        Ok(resolution)
    }

    async fn report_usage(&self, bundle: &ResourceBundle, outcome: &CheckOutcome) -> DomainResult<()> {
        let now = Utc::now();
        let tag = outcome.effective_error();

        if let Some(credential) = &bundle.credential {
            self.repository.record_credential_use(credential.id, now).await?;
            if tag == Some(ErrorTag::UpstreamAuthRequired) {
                warn!(owner_id = bundle.owner_id, credential_id = credential.id, "API credential rejected, marking not working");
                self.repository.set_credential_working(credential.id, false).await?;
            }
        }

        if let Some(proxy) = &bundle.proxy {
            let transport_failure = tag.is_some_and(|t| t.category() == ErrorCategory::Transport);
            let penalty = transport_failure.then(|| ProxyPenalty {
                threshold: self.config.proxy_failure_threshold,
                until: now
                    + chrono::Duration::from_std(self.config.proxy_cooldown)
                        .unwrap_or_else(|_| chrono::Duration::seconds(300)),
            });
            self.repository
                .record_proxy_result(proxy.id, !transport_failure, penalty)
                .await?;
        }

        if let Some(session) = &bundle.session {
            self.repository.touch_session(session.id, now).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::domain::models::ProxyScheme;

    fn proxy(id: i64, priority: u8, age_minutes: i64) -> ProxyEndpoint {
        ProxyEndpoint {
            id,
            owner_id: 1,
            scheme: ProxyScheme::Http,
            host: format!("10.0.0.{id}:8080"),
            username: None,
            encrypted_password: None,
            priority,
            active: true,
            used_count: 0,
            success_count: 0,
            fail_streak: 0,
            cooldown_until: None,
            created_at: Utc::now() - ChronoDuration::minutes(age_minutes),
        }
    }

    #[test]
    fn test_proxy_priority_wins() {
        let now = Utc::now();
        let proxies = vec![proxy(1, 5, 10), proxy(2, 1, 5), proxy(3, 1, 1)];
        assert_eq!(pick_proxy(&proxies, now).unwrap().id, 2);
    }

    #[test]
    fn test_proxy_success_rate_breaks_priority_ties() {
        let now = Utc::now();
        let mut flaky = proxy(1, 2, 10);
        flaky.used_count = 10;
        flaky.success_count = 2;
        let mut solid = proxy(2, 2, 5);
        solid.used_count = 10;
        solid.success_count = 9;
        assert_eq!(pick_proxy(&[flaky, solid], now).unwrap().id, 2);
    }

    #[test]
    fn test_proxy_in_cooldown_is_skipped_unless_all_are() {
        let now = Utc::now();
        let mut cooling = proxy(1, 1, 10);
        cooling.cooldown_until = Some(now + ChronoDuration::minutes(5));
        let spare = proxy(2, 9, 5);
        assert_eq!(pick_proxy(&[cooling.clone(), spare], now).unwrap().id, 2);

        let mut also_cooling = proxy(3, 1, 1);
        also_cooling.cooldown_until = Some(now + ChronoDuration::minutes(5));
        assert_eq!(pick_proxy(&[also_cooling, cooling], now).unwrap().id, 1);
    }

    #[test]
    fn test_inactive_proxies_are_never_used() {
        let now = Utc::now();
        let mut off = proxy(1, 1, 1);
        off.active = false;
        assert!(pick_proxy(&[off], now).is_none());
    }

    #[test]
    fn test_expired_sessions_are_ignored() {
        let now = Utc::now();
        let session = InteractiveSession {
            id: 1,
            owner_id: 1,
            account_handle: "me".into(),
            encrypted_cookies: "c".into(),
            encrypted_password: None,
            active: true,
            expires_at: Some(now - ChronoDuration::hours(1)),
            last_used_at: None,
            created_at: now,
        };
        assert!(pick_session(&[session], now).is_none());
    }
}
