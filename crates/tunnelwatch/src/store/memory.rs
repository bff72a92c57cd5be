//! In-memory status store, used by tests and short-lived agents.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RegionStatusMap, StatusMap, StatusStore, StoreError, upsert_protocol};
use crate::models::{CheckResult, ProtocolConfig, Subscriber};

#[derive(Default)]
struct Inner {
    protocols: Vec<ProtocolConfig>,
    status: StatusMap,
    regions: RegionStatusMap,
    subscribers: Vec<Subscriber>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a protocol list
    pub fn with_protocols(protocols: Vec<ProtocolConfig>) -> Self {
        Self { inner: Mutex::new(Inner { protocols, ..Inner::default() }) }
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn list_protocols(&self) -> Result<Vec<ProtocolConfig>, StoreError> {
        Ok(self.inner.lock().await.protocols.clone())
    }

    async fn add_or_replace_protocol(&self, config: ProtocolConfig) -> Result<(), StoreError> {
        upsert_protocol(&mut self.inner.lock().await.protocols, config);
        Ok(())
    }

    async fn remove_protocol(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.protocols.len();
        inner.protocols.retain(|p| p.id != id);
        inner.status.remove(id);
        Ok(inner.protocols.len() != before)
    }

    async fn local_status(&self) -> Result<StatusMap, StoreError> {
        Ok(self.inner.lock().await.status.clone())
    }

    async fn update_local_status(&self, result: CheckResult) -> Result<(), StoreError> {
        self.inner.lock().await.status.insert(result.protocol_id.clone(), result);
        Ok(())
    }

    async fn region_status(&self, region: &str) -> Result<StatusMap, StoreError> {
        Ok(self.inner.lock().await.regions.get(region).cloned().unwrap_or_default())
    }

    async fn all_region_status(&self) -> Result<RegionStatusMap, StoreError> {
        Ok(self.inner.lock().await.regions.clone())
    }

    async fn update_region_status(&self, region: &str, result: CheckResult) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .regions
            .entry(region.to_string())
            .or_default()
            .insert(result.protocol_id.clone(), result);
        Ok(())
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        Ok(self.inner.lock().await.subscribers.clone())
    }

    async fn add_subscriber(&self, user_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.subscribers.iter().any(|s| s.user_id == user_id) {
            inner.subscribers.push(Subscriber::new(user_id));
        }
        Ok(())
    }

    async fn remove_subscriber(&self, user_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.user_id != user_id);
        Ok(inner.subscribers.len() != before)
    }
}
