use futures::future::join_all;
use tracing::debug;

use super::{Checker, DirectChecker, ProbeOutcome, ProbeSettings, ProxyChecker};
use crate::models::{CheckResult, ProtocolConfig};

/// Probe executor - picks the strategy for each protocol
///
/// Protocols with a client and a SOCKS port get the proxied probe first.
/// When that does not end in `Connected`, the direct probe runs as well and
/// its verdict is kept, with the proxy failure recorded in the error text.
pub struct ProbeExecutor {
    direct: DirectChecker,
    proxy: ProxyChecker,
}

impl ProbeExecutor {
    pub fn new(settings: &ProbeSettings) -> Self {
        Self {
            direct: DirectChecker::new(settings.tcp_timeout, settings.udp_timeout),
            proxy: ProxyChecker::new(settings.tcp_timeout, settings.test_url.clone()),
        }
    }

    /// Probe one protocol and stamp the result
    pub async fn execute_check(&self, config: &ProtocolConfig) -> CheckResult {
        self.check(config).await.into_result(&config.id)
    }

    /// Probe every protocol concurrently, preserving input order
    pub async fn execute_all(&self, protocols: &[ProtocolConfig]) -> Vec<CheckResult> {
        join_all(protocols.iter().map(|config| self.execute_check(config))).await
    }
}

#[async_trait::async_trait]
impl Checker for ProbeExecutor {
    async fn check(&self, config: &ProtocolConfig) -> ProbeOutcome {
        if config.proxy_client().is_none() {
            return self.direct.check(config).await;
        }

        let proxied = self.proxy.check(config).await;
        if proxied.is_connected() {
            return proxied;
        }

        debug!(
            protocol = %config.id,
            status = %proxied.status,
            "Proxied probe did not connect, falling back to direct probe"
        );
        let direct = self.direct.check(config).await;
        merge_fallback(proxied, direct)
    }
}

/// Keep the direct verdict, carrying the proxy diagnostic along
fn merge_fallback(proxied: ProbeOutcome, mut direct: ProbeOutcome) -> ProbeOutcome {
    let proxy_note = format!(
        "proxy probe {}: {}",
        proxied.status,
        proxied.error.as_deref().unwrap_or("no detail")
    );

    direct.error = Some(match direct.error.take() {
        Some(direct_error) => format!("{}; {}", direct_error, proxy_note),
        None => proxy_note,
    });
    direct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckStatus, ClientCommand, ProtocolKind};
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[test]
    fn test_merge_keeps_direct_status() {
        let merged = merge_fallback(
            ProbeOutcome::error("client did not become ready in 1s"),
            ProbeOutcome::connected(Some(12)),
        );
        assert_eq!(merged.status, CheckStatus::Connected);
        assert_eq!(merged.latency_ms, Some(12));
        assert_eq!(
            merged.error.as_deref(),
            Some("proxy probe error: client did not become ready in 1s")
        );

        let merged = merge_fallback(
            ProbeOutcome::disconnected("HTTP 403"),
            ProbeOutcome::disconnected("TCP connection failed: refused"),
        );
        assert_eq!(merged.status, CheckStatus::Disconnected);
        assert_eq!(
            merged.error.as_deref(),
            Some("TCP connection failed: refused; proxy probe disconnected: HTTP 403")
        );
    }

    #[tokio::test]
    async fn test_plain_protocol_uses_direct_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let cfg = ProtocolConfig::new("ovpn", ProtocolKind::OpenVpn, "127.0.0.1", port);

        let executor = ProbeExecutor::new(&ProbeSettings::default());
        let result = executor.execute_check(&cfg).await;
        assert_eq!(result.protocol_id, "ovpn");
        assert_eq!(result.status, CheckStatus::Connected);
        assert!(result.error.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broken_client_falls_back_to_direct() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let cfg = ProtocolConfig::new("vless", ProtocolKind::Reality, "127.0.0.1", port).with_client(
            ClientCommand::new("echo starting; sleep 30")
                .with_socks_port(1)
                .with_ready_regex("never")
                .with_startup_timeout(1),
        );

        let settings = ProbeSettings { tcp_timeout: Duration::from_secs(2), ..ProbeSettings::default() };
        let result = ProbeExecutor::new(&settings).execute_check(&cfg).await;

        assert_eq!(result.status, CheckStatus::Connected);
        assert!(result.error.unwrap().starts_with("proxy probe error"));
    }
}
