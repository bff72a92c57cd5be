use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tunnelwatch::coordinator::{LogSink, SubscriberNotifier};
use tunnelwatch::coordinator::notify::format_latency;
use tunnelwatch::models::{ProtocolOverview, StatusCounts};
use tunnelwatch::store::overview;
use tunnelwatch::validation::validate_protocol;
use tunnelwatch::{
    CheckResult, Config, JsonStore, ProbeExecutor, ProbeSettings, ProtocolConfig, RunCoordinator,
    StatusStore,
};

pub async fn open_store(config: &Config) -> Result<Arc<JsonStore>> {
    let store = JsonStore::open(&config.storage.dir)
        .await
        .with_context(|| format!("Failed to open store at {}", config.storage.dir.display()))?;
    Ok(Arc::new(store))
}

/// Parse and validate a JSON protocol descriptor
pub fn parse_protocol(raw: &str) -> Result<ProtocolConfig> {
    let protocol = ProtocolConfig::from_json(raw).context("Invalid protocol JSON")?;
    validate_protocol(&protocol)?;
    Ok(protocol)
}

pub async fn add_protocol(config: &Config, raw: &str) -> Result<()> {
    let protocol = parse_protocol(raw)?;
    let store = open_store(config).await?;

    let id = protocol.id.clone();
    store.add_or_replace_protocol(protocol).await?;
    println!("Saved protocol {}", id);
    Ok(())
}

pub async fn remove_protocol(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    if !store.remove_protocol(id).await? {
        bail!("No protocol with id {}", id);
    }
    println!("Removed protocol {}", id);
    Ok(())
}

pub fn protocol_line(protocol: &ProtocolConfig) -> String {
    let mut line = format!("{} {} ({}) {}", protocol.id, protocol.name, protocol.kind, protocol.endpoint());
    if let Some((_, port)) = protocol.proxy_client() {
        line.push_str(&format!(" via socks :{}", port));
    }
    line
}

pub async fn list_protocols(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let protocols = store.list_protocols().await?;

    if protocols.is_empty() {
        println!("No protocols configured");
    }
    for protocol in &protocols {
        println!("{}", protocol_line(protocol));
    }
    Ok(())
}

fn result_cell(result: Option<&CheckResult>) -> String {
    match result {
        Some(r) => format!("{} ({})", r.status, format_latency(r.latency_ms)),
        None => "unknown".to_string(),
    }
}

pub fn overview_lines(entries: &[ProtocolOverview]) -> Vec<String> {
    let mut lines = vec![StatusCounts::tally(entries).to_string()];
    for entry in entries {
        let mut line = format!(
            "{} [{}] local: {}",
            entry.config.name,
            entry.config.kind,
            result_cell(entry.local.as_ref())
        );
        for (region, result) in &entry.regions {
            line.push_str(&format!(" | {}: {}", region, result_cell(Some(result))));
        }
        lines.push(line);
    }
    lines
}

pub async fn show_status(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let entries = overview(store.as_ref()).await?;
    for line in overview_lines(&entries) {
        println!("{}", line);
    }
    Ok(())
}

pub async fn check_once(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let executor = ProbeExecutor::new(&ProbeSettings::from(&config.checks));
    let coordinator = RunCoordinator::new(store.clone(), Arc::new(executor));
    coordinator.register(Arc::new(SubscriberNotifier::new(store.clone(), Arc::new(LogSink))));

    let summary = coordinator.run_once().await?;
    println!("{}", summary);

    let entries = overview(store.as_ref()).await?;
    for line in overview_lines(&entries).into_iter().skip(1) {
        println!("{}", line);
    }
    Ok(())
}

pub async fn subscribe(config: &Config, user_id: i64) -> Result<()> {
    let store = open_store(config).await?;
    store.add_subscriber(user_id).await?;
    println!("Subscribed {}", user_id);
    Ok(())
}

pub async fn unsubscribe(config: &Config, user_id: i64) -> Result<()> {
    let store = open_store(config).await?;
    if store.remove_subscriber(user_id).await? {
        println!("Unsubscribed {}", user_id);
    } else {
        println!("{} was not subscribed", user_id);
    }
    Ok(())
}

pub async fn list_subscribers(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let subscribers = store.list_subscribers().await?;

    if subscribers.is_empty() {
        println!("No subscribers");
    }
    for subscriber in subscribers {
        println!("{} (since {})", subscriber.user_id, subscriber.added_at.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tunnelwatch::{CheckStatus, ProtocolKind};

    fn config_in(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.storage.dir = dir.path().to_path_buf();
        config
    }

    #[test]
    fn test_parse_protocol_validates() {
        let parsed = parse_protocol(r#"{"id":"ss-1","type":"shadowsocks","host":"ss.example","port":8388}"#)
            .unwrap();
        assert_eq!(parsed.kind, ProtocolKind::Shadowsocks);
        assert_eq!(parsed.name, "ss-1");

        assert!(parse_protocol(r#"{"id":"ss-1","host":"","port":8388}"#).is_err());
        assert!(parse_protocol("not json").is_err());
    }

    #[tokio::test]
    async fn test_add_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        add_protocol(&config, r#"{"id":"p1","type":"openvpn","host":"vpn.example","port":1194}"#)
            .await
            .unwrap();
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.list_protocols().await.unwrap().len(), 1);

        remove_protocol(&config, "p1").await.unwrap();
        assert!(remove_protocol(&config, "p1").await.is_err());
    }

    #[test]
    fn test_overview_lines() {
        let config = ProtocolConfig::new("p1", ProtocolKind::OpenVpn, "vpn.example", 1194).with_name("Home");
        let mut regions = BTreeMap::new();
        regions.insert(
            "iran".to_string(),
            CheckResult::new("p1", CheckStatus::Disconnected),
        );
        let entries = vec![ProtocolOverview {
            config,
            local: Some(CheckResult::new("p1", CheckStatus::Connected).with_latency(Some(12))),
            regions,
        }];

        let lines = overview_lines(&entries);
        assert_eq!(lines[0], "total: 1 | connected: 1 | disconnected: 0 | error: 0");
        assert_eq!(lines[1], "Home [openvpn] local: connected (12 ms) | iran: disconnected (-)");
    }
}
