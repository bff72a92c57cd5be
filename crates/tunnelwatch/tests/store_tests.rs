//! Status store contract, exercised against both implementations

use std::sync::Arc;

use tokio_test::assert_ok;
use tunnelwatch::{
    CheckResult, CheckStatus, JsonStore, MemoryStore, ProtocolConfig, ProtocolKind, StatusStore,
};

fn protocol(id: &str, host: &str) -> ProtocolConfig {
    ProtocolConfig::new(id, ProtocolKind::Shadowsocks, host, 8388)
}

async fn stores(dir: &tempfile::TempDir) -> Vec<(&'static str, Arc<dyn StatusStore>)> {
    let memory: Arc<dyn StatusStore> = Arc::new(MemoryStore::new());
    let json: Arc<dyn StatusStore> = Arc::new(JsonStore::open(dir.path()).await.unwrap());
    vec![("memory", memory), ("json", json)]
}

#[tokio::test]
async fn test_replace_keeps_size_and_order() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in stores(&dir).await {
        assert_ok!(store.add_or_replace_protocol(protocol("a", "a1.example")).await);
        assert_ok!(store.add_or_replace_protocol(protocol("b", "b.example")).await);
        assert_ok!(store.add_or_replace_protocol(protocol("a", "a2.example")).await);

        let protocols = store.list_protocols().await.unwrap();
        let ids: Vec<_> = protocols.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"], "{name}");
        assert_eq!(protocols[0].host, "a2.example", "{name}");
    }
}

#[tokio::test]
async fn test_remove_clears_local_status() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in stores(&dir).await {
        store.add_or_replace_protocol(protocol("p1", "h")).await.unwrap();
        store.update_local_status(CheckResult::new("p1", CheckStatus::Connected)).await.unwrap();

        assert!(store.remove_protocol("p1").await.unwrap(), "{name}");
        assert!(!store.remove_protocol("p1").await.unwrap(), "{name}");
        assert!(store.list_protocols().await.unwrap().is_empty(), "{name}");
        assert!(!store.local_status().await.unwrap().contains_key("p1"), "{name}");
    }
}

#[tokio::test]
async fn test_subscribers_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in stores(&dir).await {
        assert_ok!(store.add_subscriber(42).await);
        assert_ok!(store.add_subscriber(42).await);
        assert_ok!(store.add_subscriber(7).await);

        let ids: Vec<_> = store.list_subscribers().await.unwrap().iter().map(|s| s.user_id).collect();
        assert_eq!(ids, [42, 7], "{name}");

        assert!(store.remove_subscriber(42).await.unwrap(), "{name}");
        assert!(!store.remove_subscriber(42).await.unwrap(), "{name}");
    }
}

#[tokio::test]
async fn test_regions_are_created_lazily() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in stores(&dir).await {
        assert!(store.region_status("iran").await.unwrap().is_empty(), "{name}");

        store
            .update_region_status("iran", CheckResult::new("p1", CheckStatus::Connected))
            .await
            .unwrap();
        store
            .update_region_status("turkey", CheckResult::new("p1", CheckStatus::Disconnected))
            .await
            .unwrap();

        let all = store.all_region_status().await.unwrap();
        assert_eq!(all.len(), 2, "{name}");
        assert_eq!(all["iran"]["p1"].status, CheckStatus::Connected, "{name}");
        assert_eq!(all["turkey"]["p1"].status, CheckStatus::Disconnected, "{name}");
    }
}

#[tokio::test]
async fn test_concurrent_upserts_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in stores(&dir).await {
        let writers = (0..32).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store.add_or_replace_protocol(protocol(&format!("p{i}"), "h")).await?;
                store.update_local_status(CheckResult::new(format!("p{i}"), CheckStatus::Connected)).await
            })
        });

        for writer in futures::future::join_all(writers).await {
            assert_ok!(writer.unwrap());
        }

        assert_eq!(store.list_protocols().await.unwrap().len(), 32, "{name}");
        assert_eq!(store.local_status().await.unwrap().len(), 32, "{name}");
    }
}

#[tokio::test]
async fn test_two_json_stores_share_files() {
    let dir = tempfile::tempdir().unwrap();
    let writer = JsonStore::open(dir.path()).await.unwrap();
    let reader = JsonStore::open(dir.path()).await.unwrap();

    writer.add_or_replace_protocol(protocol("p1", "h")).await.unwrap();
    writer.add_subscriber(1).await.unwrap();

    assert_eq!(reader.list_protocols().await.unwrap().len(), 1);
    assert_eq!(reader.list_subscribers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_two_json_stores_write_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let first = Arc::new(JsonStore::open(dir.path()).await.unwrap());
    let second = Arc::new(JsonStore::open(dir.path()).await.unwrap());

    let writers = (0..16).map(|i| {
        let store = if i % 2 == 0 { first.clone() } else { second.clone() };
        tokio::spawn(async move {
            store.add_subscriber(i).await?;
            store.add_or_replace_protocol(protocol(&format!("p{i}"), "h")).await
        })
    });

    for writer in futures::future::join_all(writers).await {
        assert_ok!(writer.unwrap());
    }

    // Writers in separate stores may overwrite each other, but the file stays whole
    let protocols = first.list_protocols().await.unwrap();
    assert!(!protocols.is_empty());
    assert!(!first.list_subscribers().await.unwrap().is_empty());
}
