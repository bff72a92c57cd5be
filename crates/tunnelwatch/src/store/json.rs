//! File-backed status store.
//!
//! Each collection lives in its own JSON file under the storage directory.
//! Mutations are written to a temporary sibling and renamed over the target,
//! so readers see either the old or the new file, never a partial one.
//! A file that fails to parse is treated as an empty collection.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{RegionStatusMap, StatusMap, StatusStore, StoreError, upsert_protocol};
use crate::models::{CheckResult, ProtocolConfig, Subscriber};

/// Distinguishes temp files of concurrent writers within one process
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy)]
enum Collection {
    Protocols,
    Status,
    Regions,
    Subscribers,
}

impl Collection {
    fn name(self) -> &'static str {
        match self {
            Collection::Protocols => "protocols",
            Collection::Status => "status",
            Collection::Regions => "status_regions",
            Collection::Subscribers => "subscribers",
        }
    }

    fn file_name(self) -> String {
        format!("{}.json", self.name())
    }
}

/// JSON files in a directory, one mutual-exclusion domain per instance
pub struct JsonStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonStore {
    /// Open (and create if needed) a storage directory
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Opened JSON status store");

        Ok(Self { dir, lock: Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    /// Read a collection; missing, empty or malformed files yield the default
    async fn load<T>(&self, collection: Collection) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(collection);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(
                    collection = collection.name(),
                    path = %path.display(),
                    "Stored collection is malformed, treating it as empty: {}",
                    e
                );
                Ok(T::default())
            }
        }
    }

    /// Write a collection through a temporary file and an atomic rename
    async fn save<T>(&self, collection: Collection, value: &T) -> Result<(), StoreError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)
            .map_err(|source| StoreError::Encode { collection: collection.name(), source })?;

        let path = self.path(collection);
        let tmp_path = self.dir.join(format!(
            "{}.{}.{}.tmp",
            collection.file_name(),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        Ok(())
    }
}

#[async_trait]
impl StatusStore for JsonStore {
    async fn list_protocols(&self) -> Result<Vec<ProtocolConfig>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load(Collection::Protocols).await
    }

    async fn add_or_replace_protocol(&self, config: ProtocolConfig) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut protocols: Vec<ProtocolConfig> = self.load(Collection::Protocols).await?;
        upsert_protocol(&mut protocols, config);
        self.save(Collection::Protocols, &protocols).await
    }

    async fn remove_protocol(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;

        let mut protocols: Vec<ProtocolConfig> = self.load(Collection::Protocols).await?;
        let before = protocols.len();
        protocols.retain(|p| p.id != id);
        let removed = protocols.len() != before;
        if removed {
            self.save(Collection::Protocols, &protocols).await?;
        }

        let mut status: StatusMap = self.load(Collection::Status).await?;
        if status.remove(id).is_some() {
            self.save(Collection::Status, &status).await?;
        }

        Ok(removed)
    }

    async fn local_status(&self) -> Result<StatusMap, StoreError> {
        let _guard = self.lock.lock().await;
        self.load(Collection::Status).await
    }

    async fn update_local_status(&self, result: CheckResult) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut status: StatusMap = self.load(Collection::Status).await?;
        status.insert(result.protocol_id.clone(), result);
        self.save(Collection::Status, &status).await
    }

    async fn region_status(&self, region: &str) -> Result<StatusMap, StoreError> {
        let _guard = self.lock.lock().await;
        let mut regions: RegionStatusMap = self.load(Collection::Regions).await?;
        Ok(regions.remove(region).unwrap_or_default())
    }

    async fn all_region_status(&self) -> Result<RegionStatusMap, StoreError> {
        let _guard = self.lock.lock().await;
        self.load(Collection::Regions).await
    }

    async fn update_region_status(&self, region: &str, result: CheckResult) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut regions: RegionStatusMap = self.load(Collection::Regions).await?;
        regions
            .entry(region.to_string())
            .or_default()
            .insert(result.protocol_id.clone(), result);
        self.save(Collection::Regions, &regions).await
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load(Collection::Subscribers).await
    }

    async fn add_subscriber(&self, user_id: i64) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut subscribers: Vec<Subscriber> = self.load(Collection::Subscribers).await?;
        if subscribers.iter().any(|s| s.user_id == user_id) {
            return Ok(());
        }
        subscribers.push(Subscriber::new(user_id));
        self.save(Collection::Subscribers, &subscribers).await
    }

    async fn remove_subscriber(&self, user_id: i64) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut subscribers: Vec<Subscriber> = self.load(Collection::Subscribers).await?;
        let before = subscribers.len();
        subscribers.retain(|s| s.user_id != user_id);
        if subscribers.len() == before {
            return Ok(false);
        }
        self.save(Collection::Subscribers, &subscribers).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckStatus, ProtocolKind};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("protocols.json"), b"{ not json").unwrap();
        std::fs::write(dir.path().join("status.json"), b"[1, 2").unwrap();

        let store = JsonStore::open(dir.path()).await.unwrap();
        assert!(store.list_protocols().await.unwrap().is_empty());
        assert!(store.local_status().await.unwrap().is_empty());

        // The next write replaces the corrupt file with a valid one
        store
            .add_or_replace_protocol(ProtocolConfig::new("p1", ProtocolKind::OpenVpn, "h", 1194))
            .await
            .unwrap();
        let raw = std::fs::read_to_string(dir.path().join("protocols.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["id"], "p1");
    }

    #[tokio::test]
    async fn test_write_leaves_no_temporary_files() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();

        store.update_local_status(CheckResult::new("p1", CheckStatus::Connected)).await.unwrap();
        store.add_subscriber(42).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = JsonStore::open(dir.path()).await.unwrap();
            store
                .add_or_replace_protocol(ProtocolConfig::new("p1", ProtocolKind::Reality, "h", 443))
                .await
                .unwrap();
            store
                .update_region_status("iran", CheckResult::new("p1", CheckStatus::Connected))
                .await
                .unwrap();
        }

        let store = JsonStore::open(dir.path()).await.unwrap();
        assert_eq!(store.list_protocols().await.unwrap().len(), 1);
        assert_eq!(
            store.region_status("iran").await.unwrap()["p1"].status,
            CheckStatus::Connected
        );
    }
}
