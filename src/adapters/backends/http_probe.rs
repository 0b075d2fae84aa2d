//! HTTP probe of a public profile page.
//!
//! Fetches `url_template` with `{handle}` substituted, optionally through the
//! bundle's proxy, and reads the answer from the status code and the page's
//! `og:url` meta tag.

use async_trait::async_trait;
use reqwest::{header, Client, Proxy, StatusCode, Url};
use scraper::{Html, Selector};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CheckOutcome, ErrorTag, HttpProbeConfig, ResourceBundle, Strategy};
use crate::domain::ports::VerificationBackend;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Safari/537.36";

pub struct HttpProbeBackend {
    config: HttpProbeConfig,
}

impl HttpProbeBackend {
    pub const fn new(config: HttpProbeConfig) -> Self {
        Self { config }
    }

    fn profile_url(&self, handle: &str) -> String {
        self.config.url_template.replace("{handle}", handle)
    }

    fn client(&self, bundle: &ResourceBundle, deadline: Instant) -> DomainResult<Client> {
        let user_agent = self.config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .timeout(deadline.saturating_duration_since(Instant::now()));
        if let Some(proxy) = &bundle.proxy {
            let proxy = Proxy::all(proxy.url())
                .map_err(|e| DomainError::ValidationFailed(format!("invalid proxy {}: {e}", proxy.host)))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| DomainError::BackendFailed(format!("failed to build HTTP client: {e}")))
    }

    fn classify_status(&self, status: StatusCode) -> Option<CheckOutcome> {
        let strategy = self.config.strategy;
        match status {
            StatusCode::OK => None,
            StatusCode::NOT_FOUND | StatusCode::GONE => Some(CheckOutcome::not_found(strategy)),
            StatusCode::TOO_MANY_REQUESTS => Some(CheckOutcome::unknown(strategy, ErrorTag::UpstreamRateLimited)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Some(CheckOutcome::unknown(strategy, ErrorTag::UpstreamAuthRequired))
            }
            StatusCode::PROXY_AUTHENTICATION_REQUIRED => {
                Some(CheckOutcome::unknown(strategy, ErrorTag::ProxyAuthFailed))
            }
            s if s.is_server_error() => Some(CheckOutcome::unknown(strategy, ErrorTag::Unknown)),
            _ => Some(CheckOutcome::unknown(strategy, ErrorTag::ParseFailed)),
        }
    }

    fn classify_transport_error(&self, error: &reqwest::Error, via_proxy: bool) -> CheckOutcome {
        let tag = if error.is_timeout() {
            ErrorTag::NetTimeout
        } else if error.is_connect() && via_proxy {
            ErrorTag::ProxyRefused
        } else if error.is_connect() || error.is_request() {
            ErrorTag::NetTimeout
        } else {
            ErrorTag::Unknown
        };
        CheckOutcome::unknown(self.config.strategy, tag).with_warning(error.to_string())
    }
}

/// Read a profile page body.
pub fn classify_profile_page(strategy: Strategy, handle: &str, body: &str) -> CheckOutcome {
    let lowered = body.to_lowercase();
    if lowered.contains("page not found") || lowered.contains("this page isn't available") {
        return CheckOutcome::not_found(strategy);
    }
    let names_handle = og_url(body)
        .and_then(|url| profile_segment(&url))
        .is_some_and(|segment| segment.eq_ignore_ascii_case(handle));
    if names_handle {
        return CheckOutcome::found(strategy);
    }
    if lowered.contains("captcha") || lowered.contains("/challenge/") {
        return CheckOutcome::unknown(strategy, ErrorTag::CaptchaRequired);
    }
    if lowered.contains("/accounts/login") {
        return CheckOutcome::unknown(strategy, ErrorTag::UpstreamAuthRequired);
    }
    CheckOutcome::unknown(strategy, ErrorTag::ParseFailed)
}

/// First path segment of a profile URL, e.g. `alice` for `https://site.example/alice/`.
fn profile_segment(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let segment = url.path_segments()?.next()?.trim_end_matches('/');
    (!segment.is_empty()).then(|| segment.to_string())
}

fn og_url(body: &str) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:url"]"#).ok()?;
    let document = Html::parse_document(body);
    let url = document
        .select(&selector)
        .find_map(|meta| meta.value().attr("content"))
        .map(str::to_string);
    url
}

#[async_trait]
impl VerificationBackend for HttpProbeBackend {
    fn strategy(&self) -> Strategy {
        self.config.strategy
    }

    async fn check(&self, handle: &str, bundle: &ResourceBundle, deadline: Instant) -> DomainResult<CheckOutcome> {
        if Instant::now() >= deadline {
            return Ok(CheckOutcome::unknown(self.config.strategy, ErrorTag::NetTimeout));
        }
        let client = self.client(bundle, deadline)?;
        let mut request = client
            .get(self.profile_url(handle))
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        if let (Some(name), Some(credential)) = (&self.config.api_key_header, &bundle.credential) {
            request = request.header(name.as_str(), credential.key.as_str());
        }
        if let Some(session) = &bundle.session {
            request = request.header(header::COOKIE, session.cookies.as_str());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Ok(self.classify_transport_error(&e, bundle.uses_proxy())),
        };
        let status = response.status();
        debug!(strategy = %self.config.strategy, handle, status = status.as_u16(), "Probe response");
        if let Some(outcome) = self.classify_status(status) {
            return Ok(outcome);
        }

        match response.text().await {
            Ok(body) => Ok(classify_profile_page(self.config.strategy, handle, &body)),
            Err(e) => Ok(self.classify_transport_error(&e, bundle.uses_proxy())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Existence, ResolvedCredential};
    use mockito::Server;
    use std::time::Duration;

    fn backend(base: &str) -> HttpProbeBackend {
        HttpProbeBackend::new(HttpProbeConfig {
            strategy: Strategy::ProxyHybrid,
            url_template: format!("{base}/{{handle}}/"),
            api_key_header: Some("x-api-key".to_string()),
            user_agent: None,
        })
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_page_classification() {
        let found = r#"<html><head><meta property="og:url" content="https://site.example/some.user/"></head></html>"#;
        assert_eq!(
            classify_profile_page(Strategy::ProxyHybrid, "some.user", found).exists,
            Existence::Exists
        );
        assert_eq!(
            classify_profile_page(Strategy::ProxyHybrid, "x", "<title>Page Not Found</title>").exists,
            Existence::NotFound
        );
        assert_eq!(
            classify_profile_page(Strategy::ProxyHybrid, "x", r#"<a href="/accounts/login/">"#).error_tag,
            Some(ErrorTag::UpstreamAuthRequired)
        );
        assert_eq!(
            classify_profile_page(Strategy::ProxyHybrid, "x", "<html></html>").error_tag,
            Some(ErrorTag::ParseFailed)
        );
    }

    #[test]
    fn test_og_url_must_name_the_handle_exactly() {
        let page = |url: &str| format!(r#"<meta property="og:url" content="{url}">"#);
        assert_eq!(
            classify_profile_page(Strategy::ProxyHybrid, "insta", &page("https://www.instagram.com/")).exists,
            Existence::Unknown
        );
        assert_eq!(
            classify_profile_page(Strategy::ProxyHybrid, "alice", &page("https://site.example/alice2/")).exists,
            Existence::Unknown
        );
        assert_eq!(
            classify_profile_page(Strategy::ProxyHybrid, "alice", &page("https://site.example/Alice")).exists,
            Existence::Exists
        );
    }

    #[tokio::test]
    async fn test_existing_profile() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/alice/")
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_body(r#"<meta property="og:url" content="https://site.example/alice/">"#)
            .create_async()
            .await;
        let mut bundle = ResourceBundle::empty(1, Strategy::ProxyHybrid);
        bundle.credential = Some(ResolvedCredential {
            id: 1,
            key: "secret".to_string(),
        });

        let outcome = backend(&server.url()).check("alice", &bundle, deadline()).await.unwrap();
        assert_eq!(outcome.exists, Existence::Exists);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (404, Existence::NotFound, None),
            (429, Existence::Unknown, Some(ErrorTag::UpstreamRateLimited)),
            (401, Existence::Unknown, Some(ErrorTag::UpstreamAuthRequired)),
            (407, Existence::Unknown, Some(ErrorTag::ProxyAuthFailed)),
            (503, Existence::Unknown, Some(ErrorTag::Unknown)),
        ];
        for (status, exists, tag) in cases {
            let mut server = Server::new_async().await;
            server
                .mock("GET", "/bob/")
                .with_status(status)
                .create_async()
                .await;
            let bundle = ResourceBundle::empty(1, Strategy::ProxyHybrid);
            let outcome = backend(&server.url()).check("bob", &bundle, deadline()).await.unwrap();
            assert_eq!(outcome.exists, exists, "status {status}");
            assert_eq!(outcome.error_tag, tag, "status {status}");
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_failure() {
        let bundle = ResourceBundle::empty(1, Strategy::ProxyHybrid);
        let outcome = backend("http://127.0.0.1:9").check("bob", &bundle, deadline()).await.unwrap();
        assert_eq!(outcome.exists, Existence::Unknown);
        assert_eq!(outcome.error_tag, Some(ErrorTag::NetTimeout));
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_request() {
        let bundle = ResourceBundle::empty(1, Strategy::ProxyHybrid);
        let past = Instant::now();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let outcome = backend("http://127.0.0.1:9").check("bob", &bundle, past).await.unwrap();
        assert_eq!(outcome.error_tag, Some(ErrorTag::NetTimeout));
    }
}
