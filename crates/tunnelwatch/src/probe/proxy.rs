use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use super::{Checker, ProbeOutcome, elapsed_ms};
use crate::client::ClientProcess;
use crate::models::ProtocolConfig;

/// Proxied probe: start the protocol's client, then fetch the test URL through it
///
/// Only HTTP 200 and 204 count as connected. Anything that prevents the
/// fetch from happening at all (client start, readiness, proxy, timeout)
/// is an `Error` outcome, not `Disconnected`.
pub struct ProxyChecker {
    timeout: Duration,
    test_url: String,
}

impl ProxyChecker {
    pub fn new(timeout: Duration, test_url: impl Into<String>) -> Self {
        Self { timeout, test_url: test_url.into() }
    }

    /// GET the test URL through the local SOCKS endpoint
    ///
    /// Returns the status code and the latency measured from `start`.
    async fn fetch_through(&self, socks_port: u16, start: Instant) -> Result<(u16, u64)> {
        let proxy = reqwest::Proxy::all(format!("socks5h://127.0.0.1:{}", socks_port))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .user_agent(concat!("tunnelwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let response = client.get(&self.test_url).send().await?;
        Ok((response.status().as_u16(), elapsed_ms(start)))
    }
}

#[async_trait::async_trait]
impl Checker for ProxyChecker {
    async fn check(&self, config: &ProtocolConfig) -> ProbeOutcome {
        let Some((client, socks_port)) = config.proxy_client() else {
            return ProbeOutcome::error("no client with a SOCKS port configured");
        };

        // Latency covers client startup as well as the fetch
        let start = Instant::now();
        let fetched = ClientProcess::scoped(client, || self.fetch_through(socks_port, start)).await;

        match fetched {
            Err(e) => ProbeOutcome::error(e.to_string()),
            Ok(Err(e)) => {
                debug!(protocol = %config.id, "Proxied fetch failed: {:#}", e);
                ProbeOutcome::error(format!("proxied request failed: {:#}", e))
            }
            Ok(Ok((200 | 204, latency))) => ProbeOutcome::connected(Some(latency)),
            Ok(Ok((status, _))) => ProbeOutcome::disconnected(format!("HTTP {}", status)),
        }
    }
}
