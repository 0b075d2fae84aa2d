//! Check outcomes and the error taxonomy shared by backends, the worker and
//! notifications.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::strategy::{ResourceClass, Strategy};

/// Tri-state result of a check. Only `Unknown` triggers fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Existence {
    Exists,
    NotFound,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Resource,
    Transport,
    Upstream,
    ParseLogic,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    NetTimeout,
    ProxyAuthFailed,
    ProxyRefused,
    UpstreamRateLimited,
    UpstreamAuthRequired,
    CaptchaRequired,
    ParseFailed,
    Unknown,
    InvalidHandle,
    MissingApiKey,
    MissingSession,
    MissingProxy,
    DecryptFailed,
    SkipMissingResource,
    Canceled,
    NoBackend,
}

impl ErrorTag {
    const ALL: [Self; 16] = [
        Self::NetTimeout,
        Self::ProxyAuthFailed,
        Self::ProxyRefused,
        Self::UpstreamRateLimited,
        Self::UpstreamAuthRequired,
        Self::CaptchaRequired,
        Self::ParseFailed,
        Self::Unknown,
        Self::InvalidHandle,
        Self::MissingApiKey,
        Self::MissingSession,
        Self::MissingProxy,
        Self::DecryptFailed,
        Self::SkipMissingResource,
        Self::Canceled,
        Self::NoBackend,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NetTimeout => "net_timeout",
            Self::ProxyAuthFailed => "proxy_auth_failed",
            Self::ProxyRefused => "proxy_refused",
            Self::UpstreamRateLimited => "upstream_rate_limited",
            Self::UpstreamAuthRequired => "upstream_auth_required",
            Self::CaptchaRequired => "captcha_required",
            Self::ParseFailed => "parse_failed",
            Self::Unknown => "unknown",
            Self::InvalidHandle => "invalid_handle",
            Self::MissingApiKey => "missing_api_key",
            Self::MissingSession => "missing_session",
            Self::MissingProxy => "missing_proxy",
            Self::DecryptFailed => "decrypt_failed",
            Self::SkipMissingResource => "skip_missing_resource",
            Self::Canceled => "canceled",
            Self::NoBackend => "no_backend",
        }
    }

    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::MissingApiKey
            | Self::MissingSession
            | Self::MissingProxy
            | Self::DecryptFailed
            | Self::SkipMissingResource => ErrorCategory::Resource,
            Self::NetTimeout | Self::ProxyRefused | Self::ProxyAuthFailed => {
                ErrorCategory::Transport
            }
            Self::UpstreamRateLimited | Self::UpstreamAuthRequired | Self::CaptchaRequired => {
                ErrorCategory::Upstream
            }
            Self::ParseFailed | Self::InvalidHandle => ErrorCategory::ParseLogic,
            Self::Unknown | Self::Canceled | Self::NoBackend => ErrorCategory::Internal,
        }
    }

    /// Whether the worker may try another strategy after this failure.
    pub const fn allows_fallback(self) -> bool {
        match self.category() {
            ErrorCategory::Transport | ErrorCategory::Upstream => true,
            ErrorCategory::Internal => !matches!(self, Self::Canceled),
            ErrorCategory::Resource | ErrorCategory::ParseLogic => false,
        }
    }

    /// The tag reported when a class of resource cannot be resolved.
    pub const fn missing(class: ResourceClass) -> Self {
        match class {
            ResourceClass::ApiKey => Self::MissingApiKey,
            ResourceClass::Session => Self::MissingSession,
            ResourceClass::Proxy => Self::MissingProxy,
        }
    }

    /// Text shown to the owner. Internal failures get a generic reason.
    pub const fn user_reason(self) -> &'static str {
        match self {
            Self::NetTimeout => "network timeout",
            Self::ProxyAuthFailed => "proxy rejected the credentials",
            Self::ProxyRefused => "proxy refused the connection",
            Self::UpstreamRateLimited => "rate limited by the service",
            Self::UpstreamAuthRequired => "the service requires login",
            Self::CaptchaRequired => "captcha required",
            Self::ParseFailed => "could not read the response",
            Self::InvalidHandle => "invalid handle",
            Self::MissingApiKey => "no usable API key",
            Self::MissingSession => "no usable browser session",
            Self::MissingProxy => "no usable proxy",
            Self::DecryptFailed => "stored credentials could not be decrypted",
            Self::SkipMissingResource => "required resources are missing",
            Self::NoBackend => "no verification method available",
            Self::Unknown | Self::Canceled => "internal error",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| format!("unknown error tag: {s}"))
    }
}

/// What a backend reports for one handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub exists: Existence,
    pub checked_via: Strategy,
    pub error_tag: Option<ErrorTag>,
    pub latency_seconds: Option<f64>,
    pub artifact_path: Option<PathBuf>,
    pub warning: Option<String>,
}

impl CheckOutcome {
    pub const fn found(strategy: Strategy) -> Self {
        Self::with_existence(Existence::Exists, strategy, None)
    }

    pub const fn not_found(strategy: Strategy) -> Self {
        Self::with_existence(Existence::NotFound, strategy, None)
    }

    pub const fn unknown(strategy: Strategy, tag: ErrorTag) -> Self {
        Self::with_existence(Existence::Unknown, strategy, Some(tag))
    }

    const fn with_existence(exists: Existence, strategy: Strategy, tag: Option<ErrorTag>) -> Self {
        Self {
            exists,
            checked_via: strategy,
            error_tag: tag,
            latency_seconds: None,
            artifact_path: None,
            warning: None,
        }
    }

    #[must_use]
    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, seconds: f64) -> Self {
        self.latency_seconds = Some(seconds);
        self
    }

    pub fn is_success(&self) -> bool {
        self.exists == Existence::Exists
    }

    pub fn is_conclusive(&self) -> bool {
        self.exists != Existence::Unknown
    }

    /// Error tag, defaulting to `unknown` for an inconclusive result without one.
    pub fn effective_error(&self) -> Option<ErrorTag> {
        match (self.exists, self.error_tag) {
            (_, Some(tag)) => Some(tag),
            (Existence::Unknown, None) => Some(ErrorTag::Unknown),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(ErrorTag::ProxyRefused.category(), ErrorCategory::Transport);
        assert_eq!(ErrorTag::CaptchaRequired.category(), ErrorCategory::Upstream);
        assert_eq!(ErrorTag::DecryptFailed.category(), ErrorCategory::Resource);
        assert_eq!(ErrorTag::InvalidHandle.category(), ErrorCategory::ParseLogic);
        assert_eq!(ErrorTag::Unknown.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_fallback_rules() {
        assert!(ErrorTag::NetTimeout.allows_fallback());
        assert!(ErrorTag::UpstreamRateLimited.allows_fallback());
        assert!(ErrorTag::Unknown.allows_fallback());
        assert!(ErrorTag::NoBackend.allows_fallback());
        assert!(!ErrorTag::ParseFailed.allows_fallback());
        assert!(!ErrorTag::MissingProxy.allows_fallback());
        assert!(!ErrorTag::Canceled.allows_fallback());
    }

    #[test]
    fn test_tags_round_trip_through_str() {
        for tag in ErrorTag::ALL {
            assert_eq!(tag.as_str().parse::<ErrorTag>().unwrap(), tag);
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag.as_str()));
        }
    }

    #[test]
    fn test_internal_reason_is_generic() {
        assert_eq!(ErrorTag::Unknown.user_reason(), "internal error");
    }

    #[test]
    fn test_effective_error_defaults_to_unknown() {
        let mut outcome = CheckOutcome::unknown(Strategy::ApiDirect, ErrorTag::NetTimeout);
        assert_eq!(outcome.effective_error(), Some(ErrorTag::NetTimeout));
        outcome.error_tag = None;
        assert_eq!(outcome.effective_error(), Some(ErrorTag::Unknown));
        assert_eq!(CheckOutcome::found(Strategy::ApiDirect).effective_error(), None);
    }
}
