/// Probe strategies - turn a protocol configuration into a reachability outcome
///
/// This module provides:
/// - A direct transport probe (TCP connect, best-effort UDP datagram)
/// - A proxied probe that fetches a test URL through a local client's SOCKS port
/// - The executor that picks a strategy per protocol and applies the fallback policy
pub mod direct;
pub mod executor;
pub mod proxy;

pub use direct::DirectChecker;
pub use executor::ProbeExecutor;
pub use proxy::ProxyChecker;

use std::time::Duration;

use crate::DEFAULT_TEST_URL;
use crate::config::ChecksConfig;
use crate::models::{CheckResult, CheckStatus, ProtocolConfig};

/// Checker trait for the different probe strategies
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Probe one protocol; failures are part of the outcome, never an `Err`
    async fn check(&self, config: &ProtocolConfig) -> ProbeOutcome;
}

/// `(status, latency, error)` produced by a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: CheckStatus,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn connected(latency_ms: Option<u64>) -> Self {
        Self { status: CheckStatus::Connected, latency_ms, error: None }
    }

    pub fn disconnected(error: impl Into<String>) -> Self {
        Self { status: CheckStatus::Disconnected, latency_ms: None, error: Some(error.into()) }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self { status: CheckStatus::Error, latency_ms: None, error: Some(error.into()) }
    }

    pub fn is_connected(&self) -> bool {
        self.status == CheckStatus::Connected
    }

    /// Stamp the outcome as the latest result for `protocol_id`
    pub fn into_result(self, protocol_id: &str) -> CheckResult {
        CheckResult::new(protocol_id, self.status)
            .with_latency(self.latency_ms)
            .with_error(self.error)
    }
}

/// Timeouts and test target shared by all probes
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub tcp_timeout: Duration,
    pub udp_timeout: Duration,
    pub test_url: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            tcp_timeout: Duration::from_secs(5),
            udp_timeout: Duration::from_secs(3),
            test_url: DEFAULT_TEST_URL.to_string(),
        }
    }
}

impl From<&ChecksConfig> for ProbeSettings {
    fn from(checks: &ChecksConfig) -> Self {
        Self {
            tcp_timeout: Duration::from_secs(checks.tcp_timeout_seconds),
            udp_timeout: Duration::from_secs(checks.udp_timeout_seconds),
            test_url: checks.test_url.clone(),
        }
    }
}

/// Elapsed milliseconds, saturating
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
