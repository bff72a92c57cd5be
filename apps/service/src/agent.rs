use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tunnelwatch::{
    Config, ProbeExecutor, ProbeSettings, ProtocolConfig, RegionalAgent, StatusStore,
};

use crate::commands::open_store;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AgentOptions {
    pub once: bool,
    pub interval: Option<u64>,
    pub remote_config: bool,
}

async fn load_protocols(
    config: &Config,
    agent: &RegionalAgent,
    remote: bool,
) -> Result<Vec<ProtocolConfig>> {
    if remote {
        return agent.fetch_protocols().await.context("Failed to fetch protocols from server");
    }
    let store = open_store(config).await?;
    Ok(store.list_protocols().await?)
}

async fn cycle(config: &Config, agent: &RegionalAgent, executor: &ProbeExecutor, remote: bool) -> Result<()> {
    let protocols = load_protocols(config, agent, remote).await?;
    if protocols.is_empty() {
        warn!("No protocols to check");
        return Ok(());
    }

    let ack = agent.run_cycle(executor, &protocols).await?;
    println!(
        "Reported {} results for {} ({} skipped by server)",
        ack.summary.accepted,
        agent.region(),
        ack.summary.skipped
    );
    Ok(())
}

/// Run the regional agent until Ctrl-C, or once
pub async fn run(config: &Config, options: AgentOptions) -> Result<()> {
    let agent = RegionalAgent::from_config(&config.agent, REQUEST_TIMEOUT)?;
    let executor = ProbeExecutor::new(&ProbeSettings::from(&config.checks));

    if options.once {
        return cycle(config, &agent, &executor, options.remote_config).await;
    }

    let interval = Duration::from_secs(options.interval.unwrap_or(config.checks.interval_seconds).max(1));
    info!(region = agent.region(), interval_secs = interval.as_secs(), "Starting regional agent");

    loop {
        if let Err(e) = cycle(config, &agent, &executor, options.remote_config).await {
            error!("Agent cycle failed: {:#}", e);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping agent");
                break;
            }
        }
    }

    Ok(())
}
