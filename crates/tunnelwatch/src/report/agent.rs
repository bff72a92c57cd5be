use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::{IngestAck, RegionReport};
use crate::config::AgentConfig;
use crate::models::{CheckResult, ProtocolConfig};
use crate::probe::ProbeExecutor;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid server URL {url}: {source}")]
    InvalidServer {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to central server failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("central server rejected request with {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Regional agent - probes locally and reports to the central server
pub struct RegionalAgent {
    client: reqwest::Client,
    server: Url,
    token: Option<String>,
    region: String,
}

impl RegionalAgent {
    pub fn new(
        server: &str,
        region: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let mut server = Url::parse(server)
            .map_err(|source| AgentError::InvalidServer { url: server.to_string(), source })?;
        // `join` replaces the last segment unless the path ends in a slash
        if !server.path().ends_with('/') {
            let path = format!("{}/", server.path());
            server.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tunnelwatch-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            server,
            token: token.filter(|t| !t.is_empty()),
            region: region.into(),
        })
    }

    pub fn from_config(config: &AgentConfig, timeout: Duration) -> Result<Self, AgentError> {
        Self::new(&config.server, config.region.clone(), config.token.clone(), timeout)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn endpoint(&self, path: &str) -> Result<Url, AgentError> {
        self.server
            .join(path)
            .map_err(|source| AgentError::InvalidServer { url: self.server.to_string(), source })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AgentError::Rejected { status, body })
    }

    /// Submit one batch of results
    pub async fn submit(&self, results: &[CheckResult]) -> Result<IngestAck, AgentError> {
        let report = RegionReport::from_results(self.region.clone(), results)?;
        let request = self.client.post(self.endpoint("report")?).json(&report);

        let response = Self::checked(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Protocol list served by the central server
    pub async fn fetch_protocols(&self) -> Result<Vec<ProtocolConfig>, AgentError> {
        let request = self.client.get(self.endpoint("protocols")?);
        let response = Self::checked(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Probe every protocol and submit the batch
    pub async fn run_cycle(
        &self,
        executor: &ProbeExecutor,
        protocols: &[ProtocolConfig],
    ) -> Result<IngestAck, AgentError> {
        let results = executor.execute_all(protocols).await;
        debug!(region = %self.region, results = results.len(), "Submitting report");

        let ack = self.submit(&results).await?;
        info!(
            region = %self.region,
            accepted = ack.summary.accepted,
            skipped = ack.summary.skipped,
            "Report accepted"
        );
        Ok(ack)
    }
}
