use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::protocol::ProtocolConfig;

/// Outcome class of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CheckStatus {
    /// Endpoint answered
    Connected,
    /// Endpoint confirmed unreachable
    Disconnected,
    /// The check itself could not be carried out
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Connected => "connected",
            CheckStatus::Disconnected => "disconnected",
            CheckStatus::Error => "error",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown check status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CheckStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "connected" => Ok(CheckStatus::Connected),
            "disconnected" => Ok(CheckStatus::Disconnected),
            "error" => Ok(CheckStatus::Error),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for CheckStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, UnknownStatus> {
        value.parse()
    }
}

impl From<CheckStatus> for String {
    fn from(status: CheckStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Latest observed result for one protocol in one scope (local or a region)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Id of the protocol that was checked
    pub protocol_id: String,

    /// Status of the check
    pub status: CheckStatus,

    /// Round trip in milliseconds, only when one was measured
    #[serde(default)]
    pub latency_ms: Option<u64>,

    /// When the probe completed
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Failure reason (if any)
    #[serde(default)]
    pub error: Option<String>,
}

impl CheckResult {
    /// Create a result stamped with the current time
    pub fn new(protocol_id: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            protocol_id: protocol_id.into(),
            status,
            latency_ms: None,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: Option<u64>) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.status == CheckStatus::Connected
    }
}

/// A notification recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub user_id: i64,
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn new(user_id: i64) -> Self {
        Self { user_id, added_at: Utc::now() }
    }
}

/// One protocol joined with everything known about its reachability
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolOverview {
    pub config: ProtocolConfig,
    pub local: Option<CheckResult>,
    /// Region name to the result reported from there
    pub regions: BTreeMap<String, CheckResult>,
}

/// Per-status tally of local results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub connected: usize,
    pub disconnected: usize,
    pub error: usize,
    /// Protocols with no local result yet
    pub unknown: usize,
}

impl StatusCounts {
    pub fn tally(entries: &[ProtocolOverview]) -> Self {
        let mut counts = Self { total: entries.len(), ..Self::default() };
        for entry in entries {
            match entry.local.as_ref().map(|r| r.status) {
                Some(CheckStatus::Connected) => counts.connected += 1,
                Some(CheckStatus::Disconnected) => counts.disconnected += 1,
                Some(CheckStatus::Error) => counts.error += 1,
                None => counts.unknown += 1,
            }
        }
        counts
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total: {} | connected: {} | disconnected: {} | error: {}",
            self.total, self.connected, self.disconnected, self.error
        )?;
        if self.unknown > 0 {
            write!(f, " | unknown: {}", self.unknown)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("CONNECTED".parse::<CheckStatus>().unwrap(), CheckStatus::Connected);
        assert_eq!(" disconnected ".parse::<CheckStatus>().unwrap(), CheckStatus::Disconnected);
        assert!("up".parse::<CheckStatus>().is_err());
    }

    #[test]
    fn test_status_deserializes_any_case() {
        let result: CheckResult =
            serde_json::from_str(r#"{"protocol_id":"p1","status":"Disconnected"}"#).unwrap();
        assert_eq!(result.status, CheckStatus::Disconnected);
        assert!(serde_json::from_str::<CheckStatus>(r#""sideways""#).is_err());
    }

    #[test]
    fn test_result_serializes_lowercase_status() {
        let result = CheckResult::new("p1", CheckStatus::Error).with_error(Some("boom".into()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
        assert!(json["latency_ms"].is_null());
    }

    #[test]
    fn test_counts_display() {
        let counts = StatusCounts { total: 3, connected: 1, disconnected: 1, error: 1, unknown: 0 };
        assert_eq!(
            counts.to_string(),
            "total: 3 | connected: 1 | disconnected: 1 | error: 1"
        );
    }
}
