//! tunnelwatch operator CLI
//!
//! Manages the protocol list and subscribers in the local store, runs
//! one-off checks, and runs the regional agent.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tunnelwatch::Config;

mod agent;
mod commands;

/// Reachability monitor for VPN and proxy endpoints
#[derive(Parser)]
#[command(name = "tunnelwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: ~/.config/tunnelwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage monitored protocols
    #[command(subcommand)]
    Protocol(ProtocolCommand),

    /// Show the latest local and regional status of every protocol
    Status,

    /// Check every protocol once and record the results
    Check,

    /// Add a notification subscriber
    Subscribe { user_id: i64 },

    /// Remove a notification subscriber
    Unsubscribe { user_id: i64 },

    /// List notification subscribers
    Subscribers,

    /// Run as a regional agent reporting to the central server
    Agent {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Seconds between cycles (default: checks.interval_seconds)
        #[arg(long)]
        interval: Option<u64>,

        /// Fetch the protocol list from the central server instead of the local store
        #[arg(long)]
        remote_config: bool,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum ProtocolCommand {
    /// Add or replace a protocol from its JSON descriptor
    Add { json: String },

    /// Remove a protocol by id
    Remove { id: String },

    /// List configured protocols
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    logger::init_tracing_with_level(level);

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Protocol(ProtocolCommand::Add { json }) => commands::add_protocol(&config, &json).await,
        Commands::Protocol(ProtocolCommand::Remove { id }) => commands::remove_protocol(&config, &id).await,
        Commands::Protocol(ProtocolCommand::List) => commands::list_protocols(&config).await,
        Commands::Status => commands::show_status(&config).await,
        Commands::Check => commands::check_once(&config).await,
        Commands::Subscribe { user_id } => commands::subscribe(&config, user_id).await,
        Commands::Unsubscribe { user_id } => commands::unsubscribe(&config, user_id).await,
        Commands::Subscribers => commands::list_subscribers(&config).await,
        Commands::Agent { once, interval, remote_config } => {
            let options = agent::AgentOptions { once, interval, remote_config };
            agent::run(&config, options).await
        }
        Commands::Config => {
            println!("{}", config);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_agent_flags() {
        let cli = Cli::parse_from(["tunnelwatch", "agent", "--once", "--remote-config"]);
        match cli.command {
            Commands::Agent { once, interval, remote_config } => {
                assert!(once);
                assert!(remote_config);
                assert_eq!(interval, None);
            }
            _ => panic!("expected agent command"),
        }
    }

    #[test]
    fn test_protocol_add_takes_json() {
        let cli = Cli::parse_from(["tunnelwatch", "-v", "protocol", "add", r#"{"id":"p1"}"#]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Protocol(ProtocolCommand::Add { json }) if json == r#"{"id":"p1"}"#
        ));
    }
}
