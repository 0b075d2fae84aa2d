use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::owner::OwnerId;
use super::strategy::Strategy;

/// One row of the strategy history log.
///
/// `strategy` and `error` are kept as raw strings so a history file written
/// with a different strategy set still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    #[serde(with = "iso_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub success: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub response_time: f64,
    #[serde(default)]
    pub proxy_used: bool,
    #[serde(default)]
    pub user_id: Option<OwnerId>,
}

impl AttemptRecord {
    pub fn new(strategy: Strategy, success: bool, response_time: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            strategy: strategy.as_str().to_string(),
            success,
            username: None,
            error: None,
            response_time,
            proxy_used: false,
            user_id: None,
        }
    }

    #[must_use]
    pub fn for_handle(mut self, owner_id: OwnerId, handle: impl Into<String>) -> Self {
        self.user_id = Some(owner_id);
        self.username = Some(handle.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub const fn with_proxy(mut self, proxy_used: bool) -> Self {
        self.proxy_used = proxy_used;
        self
    }

    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn parsed_strategy(&self) -> Option<Strategy> {
        self.strategy.parse().ok()
    }
}

/// RFC 3339 on write; on read also accepts naive ISO-8601 timestamps (UTC assumed).
mod iso_timestamp {
    use super::{DateTime, Deserialize, Deserializer, NaiveDateTime, Serializer, Utc};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_naive_timestamps() {
        let json = r#"{"timestamp":"2025-01-01T12:00:00.123456","strategy":"api_direct","success":true,"username":"bob","error":null,"response_time":1.5,"proxy_used":false,"user_id":42}"#;
        let record: AttemptRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.parsed_strategy(), Some(Strategy::ApiDirect));
        assert_eq!(record.user_id, Some(42));
        assert_eq!(record.timestamp.to_rfc3339(), "2025-01-01T12:00:00.123456+00:00");
    }

    #[test]
    fn test_unknown_strategy_still_loads() {
        let json = r#"{"timestamp":"2025-01-01T12:00:00Z","strategy":"retired","success":false}"#;
        let record: AttemptRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.parsed_strategy(), None);
        assert!((record.response_time - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_builder_fields() {
        let record = AttemptRecord::new(Strategy::ProxyHybrid, false, 3.0)
            .for_handle(9, "someone")
            .with_error("proxy_refused")
            .with_proxy(true);
        assert_eq!(record.strategy, "proxy_hybrid");
        assert_eq!(record.username.as_deref(), Some("someone"));
        assert_eq!(record.error.as_deref(), Some("proxy_refused"));
        assert!(record.proxy_used);
    }
}
