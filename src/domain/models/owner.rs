use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::{ResourceClass, Strategy};

pub type OwnerId = i64;

pub const DEFAULT_CHECK_INTERVAL_MINUTES: u32 = 5;
pub const MIN_CHECK_INTERVAL_MINUTES: u32 = 1;
pub const MAX_CHECK_INTERVAL_MINUTES: u32 = 1440;

/// Clamp a stored interval into the accepted 1..=1440 minute range.
pub fn clamp_interval_minutes(minutes: i64) -> u32 {
    let clamped = minutes.clamp(
        i64::from(MIN_CHECK_INTERVAL_MINUTES),
        i64::from(MAX_CHECK_INTERVAL_MINUTES),
    );
    u32::try_from(clamped).unwrap_or(DEFAULT_CHECK_INTERVAL_MINUTES)
}

/// How an owner wants their handles verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckMode {
    #[serde(rename = "api_only")]
    ApiOnly,
    #[serde(rename = "api+browser")]
    ApiBrowser,
    #[serde(rename = "api+proxy")]
    ApiProxy,
    #[serde(rename = "api+proxy+browser")]
    ApiProxyBrowser,
    #[serde(rename = "browser+proxy")]
    BrowserProxy,
    #[serde(rename = "browser_only")]
    BrowserOnly,
    #[serde(rename = "proxy_only")]
    ProxyOnly,
}

impl CheckMode {
    pub const ALL: [Self; 7] = [
        Self::ApiOnly,
        Self::ApiBrowser,
        Self::ApiProxy,
        Self::ApiProxyBrowser,
        Self::BrowserProxy,
        Self::BrowserOnly,
        Self::ProxyOnly,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiOnly => "api_only",
            Self::ApiBrowser => "api+browser",
            Self::ApiProxy => "api+proxy",
            Self::ApiProxyBrowser => "api+proxy+browser",
            Self::BrowserProxy => "browser+proxy",
            Self::BrowserOnly => "browser_only",
            Self::ProxyOnly => "proxy_only",
        }
    }

    /// Resource classes an owner must hold for this mode to be usable.
    pub const fn required_classes(self) -> &'static [ResourceClass] {
        match self {
            Self::ApiOnly => &[ResourceClass::ApiKey],
            Self::ApiBrowser => &[ResourceClass::ApiKey, ResourceClass::Session],
            Self::ApiProxy => &[ResourceClass::ApiKey, ResourceClass::Proxy],
            Self::ApiProxyBrowser => &[
                ResourceClass::ApiKey,
                ResourceClass::Proxy,
                ResourceClass::Session,
            ],
            Self::BrowserProxy => &[ResourceClass::Session, ResourceClass::Proxy],
            Self::BrowserOnly => &[ResourceClass::Session],
            Self::ProxyOnly => &[ResourceClass::Proxy],
        }
    }

    /// The strategy a check starts with when the owner pinned this mode.
    pub const fn primary_strategy(self) -> Strategy {
        match self {
            Self::ApiOnly | Self::ApiBrowser | Self::ApiProxyBrowser => Strategy::ApiDirect,
            Self::ApiProxy | Self::ProxyOnly => Strategy::ProxyHybrid,
            Self::BrowserProxy => Strategy::BrowserMobile,
            Self::BrowserOnly => Strategy::BrowserAdvanced,
        }
    }
}

impl fmt::Display for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckMode {
    type Err = String;

    /// Also accepts the legacy spellings where the browser session was called
    /// `instagram` (`api+instagram`, `instagram+proxy`, `instagram`, `proxy`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = match s.trim().to_ascii_lowercase().as_str() {
            "api_only" | "api" => Self::ApiOnly,
            "api+browser" | "api+instagram" => Self::ApiBrowser,
            "api+proxy" => Self::ApiProxy,
            "api+proxy+browser" | "api+proxy+instagram" => Self::ApiProxyBrowser,
            "browser+proxy" | "instagram+proxy" => Self::BrowserProxy,
            "browser_only" | "instagram" | "browser" => Self::BrowserOnly,
            "proxy_only" | "proxy" => Self::ProxyOnly,
            other => return Err(format!("unknown check mode: {other}")),
        };
        Ok(mode)
    }
}

/// A registered principal with private resources and handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub username: Option<String>,
    pub auto_check_enabled: bool,
    pub auto_check_interval_minutes: u32,
    pub preferred_mode: Option<CheckMode>,
    pub created_at: DateTime<Utc>,
}

impl Owner {
    pub fn new(id: OwnerId) -> Self {
        Self {
            id,
            username: None,
            auto_check_enabled: true,
            auto_check_interval_minutes: DEFAULT_CHECK_INTERVAL_MINUTES,
            preferred_mode: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: CheckMode) -> Self {
        self.preferred_mode = Some(mode);
        self
    }

    #[must_use]
    pub const fn with_auto_check(mut self, enabled: bool) -> Self {
        self.auto_check_enabled = enabled;
        self
    }

    /// Set the per-owner interval, clamped into range.
    #[must_use]
    pub fn with_interval_minutes(mut self, minutes: i64) -> Self {
        self.auto_check_interval_minutes = clamp_interval_minutes(minutes);
        self
    }
}
