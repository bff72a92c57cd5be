//! Notification fan-out to subscribers.
//!
//! [`SubscriberNotifier`] is the listener the central server registers: on
//! every transition into `Connected` it loads the subscriber list and hands
//! one message per subscriber to a [`NotificationSink`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::TransitionListener;
use crate::models::{CheckResult, ProtocolConfig};
use crate::store::StatusStore;

/// Delivers a text message to one subscriber
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, user_id: i64, text: &str) -> Result<()>;
}

/// Writes notifications to the log
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, user_id: i64, text: &str) -> Result<()> {
        info!(user_id, "Notification: {}", text.replace('\n', " | "));
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    user_id: i64,
    text: &'a str,
}

/// POSTs `{user_id, text}` to a webhook
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, user_id: i64, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { user_id, text })
            .send()
            .await
            .context("webhook request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("webhook responded with {}", response.status()));
        }
        Ok(())
    }
}

/// Listener that messages every subscriber
pub struct SubscriberNotifier {
    store: Arc<dyn StatusStore>,
    sink: Arc<dyn NotificationSink>,
}

impl SubscriberNotifier {
    pub fn new(store: Arc<dyn StatusStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }
}

#[async_trait]
impl TransitionListener for SubscriberNotifier {
    async fn on_transition(
        &self,
        _old: Option<&CheckResult>,
        new: &CheckResult,
        config: &ProtocolConfig,
    ) -> Result<()> {
        let subscribers = self.store.list_subscribers().await?;
        if subscribers.is_empty() {
            return Ok(());
        }

        let text = connected_message(config, new);
        for subscriber in subscribers {
            if let Err(e) = self.sink.deliver(subscriber.user_id, &text).await {
                warn!(
                    user_id = subscriber.user_id,
                    protocol = %config.id,
                    "Failed to deliver notification: {:#}",
                    e
                );
            }
        }

        Ok(())
    }
}

pub fn format_latency(latency_ms: Option<u64>) -> String {
    match latency_ms {
        Some(ms) => format!("{} ms", ms),
        None => "-".to_string(),
    }
}

/// Text announcing that a protocol is reachable again
pub fn connected_message(config: &ProtocolConfig, result: &CheckResult) -> String {
    format!(
        "✅ {} ({}) is CONNECTED\nHost: {}\nLatency: {}\nTime: {}",
        config.name,
        config.kind,
        config.endpoint(),
        format_latency(result.latency_ms),
        result.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
    )
}
