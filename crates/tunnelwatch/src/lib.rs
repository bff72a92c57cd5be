//! tunnelwatch - reachability monitoring for VPN and proxy endpoints
//!
//! This library probes a configured set of tunnel endpoints, keeps the latest
//! status of each one, notifies subscribers when an endpoint comes back, and
//! merges results reported by remote regional agents.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod models;
pub mod probe;
pub mod report;
pub mod store;
pub mod validation;

// Re-export main types
pub use client::{ClientError, ClientProcess, ClientState};
pub use config::Config;
pub use coordinator::{RunCoordinator, RunSummary, TransitionListener};
pub use models::{
    CheckResult, CheckStatus, ClientCommand, ProtocolConfig, ProtocolKind, Subscriber, Transport,
};
pub use probe::{ProbeExecutor, ProbeOutcome, ProbeSettings};
pub use report::{AgentError, IngestAck, IngestSummary, RegionReport, RegionalAgent};
pub use store::{JsonStore, MemoryStore, StatusStore, StoreError};

/// Re-export common error types
pub use anyhow;

/// tunnelwatch result type using anyhow for error handling
pub type Result<T> = anyhow::Result<T>;

/// URL fetched through the local SOCKS endpoint during proxied probes
pub const DEFAULT_TEST_URL: &str = "https://www.google.com/generate_204";
