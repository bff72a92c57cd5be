//! Regional aggregation
//!
//! Remote agents probe the shared protocol list from their own network and
//! submit one [`RegionReport`] per cycle. The central server merges every
//! well-formed item into that region's status map, last write wins.

pub mod agent;

pub use agent::{AgentError, RegionalAgent};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::CheckResult;
use crate::store::{StatusStore, StoreError};

pub const UNKNOWN_REGION: &str = "unknown";

fn unknown_region() -> String {
    UNKNOWN_REGION.to_string()
}

/// One batched submission from a regional agent
///
/// Items are kept as raw JSON so that one malformed entry cannot reject the
/// whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionReport {
    #[serde(default = "unknown_region")]
    pub region: String,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl RegionReport {
    /// Build a report from results an agent produced
    pub fn from_results(region: impl Into<String>, results: &[CheckResult]) -> serde_json::Result<Self> {
        let results = results.iter().map(serde_json::to_value).collect::<Result<_, _>>()?;
        Ok(Self { region: region.into(), results })
    }
}

/// Counts returned to the submitting agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub accepted: usize,
    pub skipped: usize,
}

/// Body of a successful `/report` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestAck {
    pub ok: bool,
    #[serde(flatten)]
    pub summary: IngestSummary,
}

impl From<IngestSummary> for IngestAck {
    fn from(summary: IngestSummary) -> Self {
        Self { ok: true, summary }
    }
}

/// Parse one submitted item; `None` when it is not a usable result
pub fn parse_item(item: &Value) -> Option<CheckResult> {
    let result: CheckResult = serde_json::from_value(item.clone()).ok()?;
    if result.protocol_id.trim().is_empty() {
        return None;
    }
    Some(result)
}

/// Merge a report into the store
///
/// Items are applied in order, so a later item for the same protocol wins.
/// A blank region name is stored as `unknown`.
pub async fn ingest_report(
    store: &dyn StatusStore,
    report: &RegionReport,
) -> Result<IngestSummary, StoreError> {
    let region = match report.region.trim() {
        "" => UNKNOWN_REGION,
        name => name,
    };

    let mut summary = IngestSummary::default();
    for item in &report.results {
        match parse_item(item) {
            Some(result) => {
                store.update_region_status(region, result).await?;
                summary.accepted += 1;
            }
            None => {
                warn!(region, "Skipping malformed report item: {}", item);
                summary.skipped += 1;
            }
        }
    }

    debug!(region, accepted = summary.accepted, skipped = summary.skipped, "Report ingested");
    Ok(summary)
}
