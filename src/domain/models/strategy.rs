//! Verification strategies and the resource classes they depend on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Class of owner resource a strategy needs before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    ApiKey,
    Session,
    Proxy,
}

impl ResourceClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Session => "session",
            Self::Proxy => "proxy",
        }
    }

    /// Human-facing name used in skip notifications.
    pub const fn label(self) -> &'static str {
        match self {
            Self::ApiKey => "API key",
            Self::Session => "browser session",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verification method. The enabled subset is chosen in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ApiDirect,
    BrowserAdvanced,
    BrowserMobile,
    ProxyHybrid,
    BrowserStealth,
}

impl Strategy {
    /// Fixed order, used for stable tie-breaking.
    pub const ALL: [Self; 5] = [
        Self::ApiDirect,
        Self::BrowserAdvanced,
        Self::BrowserMobile,
        Self::ProxyHybrid,
        Self::BrowserStealth,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiDirect => "api_direct",
            Self::BrowserAdvanced => "browser_advanced",
            Self::BrowserMobile => "browser_mobile",
            Self::ProxyHybrid => "proxy_hybrid",
            Self::BrowserStealth => "browser_stealth",
        }
    }

    /// Resource classes that must be resolvable before this strategy runs.
    pub const fn required_classes(self) -> &'static [ResourceClass] {
        match self {
            Self::ApiDirect => &[ResourceClass::ApiKey],
            Self::ProxyHybrid => &[ResourceClass::Proxy],
            Self::BrowserAdvanced | Self::BrowserStealth => &[ResourceClass::Session],
            Self::BrowserMobile => &[ResourceClass::Session, ResourceClass::Proxy],
        }
    }

    /// Position in [`Strategy::ALL`].
    pub fn ordinal(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("unknown strategy: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trips_through_str() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
        assert!("carrier_pigeon".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_only_proxy_hybrid_runs_on_proxies_alone() {
        let proxy_only: Vec<_> = Strategy::ALL
            .into_iter()
            .filter(|s| s.required_classes() == [ResourceClass::Proxy])
            .collect();
        assert_eq!(proxy_only, vec![Strategy::ProxyHybrid]);
    }

    #[test]
    fn test_serde_uses_snake_case_tags() {
        let json = serde_json::to_string(&Strategy::BrowserMobile).unwrap();
        assert_eq!(json, "\"browser_mobile\"");
    }
}
