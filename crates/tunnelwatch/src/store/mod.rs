//! Status store
//!
//! The only owner of persisted state: protocol configurations, the latest
//! local result per protocol, the latest result per protocol per region,
//! and notification subscribers. Every read-modify-write sequence runs under
//! the implementation's serialization boundary.

pub mod json;
pub mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CheckResult, ProtocolConfig, ProtocolOverview, Subscriber};

/// Latest results keyed by protocol id
pub type StatusMap = HashMap<String, CheckResult>;

/// Region name to that region's status map
pub type RegionStatusMap = HashMap<String, StatusMap>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode {collection}: {source}")]
    Encode {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage contract shared by the file-backed and in-memory stores
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// All configured protocols, in insertion order
    async fn list_protocols(&self) -> Result<Vec<ProtocolConfig>, StoreError>;

    /// Insert a protocol, or replace the entry with the same id in place
    async fn add_or_replace_protocol(&self, config: ProtocolConfig) -> Result<(), StoreError>;

    /// Remove a protocol and its local status; true if the protocol existed
    async fn remove_protocol(&self, id: &str) -> Result<bool, StoreError>;

    /// Latest local result per protocol id
    async fn local_status(&self) -> Result<StatusMap, StoreError>;

    /// Replace the local result for `result.protocol_id`
    async fn update_local_status(&self, result: CheckResult) -> Result<(), StoreError>;

    /// Latest results reported by one region (empty if it never reported)
    async fn region_status(&self, region: &str) -> Result<StatusMap, StoreError>;

    /// Every region's results
    async fn all_region_status(&self) -> Result<RegionStatusMap, StoreError>;

    /// Replace one region's result for `result.protocol_id`, creating the region if needed
    async fn update_region_status(&self, region: &str, result: CheckResult) -> Result<(), StoreError>;

    /// All subscribers, in subscription order
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Add a subscriber; no-op if already present
    async fn add_subscriber(&self, user_id: i64) -> Result<(), StoreError>;

    /// Remove a subscriber; true if it was present
    async fn remove_subscriber(&self, user_id: i64) -> Result<bool, StoreError>;
}

/// Join every configured protocol with its local and regional results
pub async fn overview(store: &dyn StatusStore) -> Result<Vec<ProtocolOverview>, StoreError> {
    let protocols = store.list_protocols().await?;
    let mut local = store.local_status().await?;
    let regions = store.all_region_status().await?;

    Ok(protocols
        .into_iter()
        .map(|config| {
            let regional: BTreeMap<String, CheckResult> = regions
                .iter()
                .filter_map(|(region, results)| {
                    results.get(&config.id).map(|r| (region.clone(), r.clone()))
                })
                .collect();

            ProtocolOverview { local: local.remove(&config.id), regions: regional, config }
        })
        .collect())
}

/// Shared replace-by-id step used by every implementation
pub(crate) fn upsert_protocol(protocols: &mut Vec<ProtocolConfig>, config: ProtocolConfig) {
    match protocols.iter_mut().find(|existing| existing.id == config.id) {
        Some(existing) => *existing = config,
        None => protocols.push(config),
    }
}
