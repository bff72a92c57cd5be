use async_trait::async_trait;

use crate::models::{CheckResult, ProtocolConfig};

/// Handle returned by [`RunCoordinator::register`](super::RunCoordinator::register)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Receives a call for every transition into `Connected`
///
/// `old` is the stored result the transition is measured against, if any.
/// Errors are logged by the coordinator and never reach other listeners.
#[async_trait]
pub trait TransitionListener: Send + Sync {
    async fn on_transition(
        &self,
        old: Option<&CheckResult>,
        new: &CheckResult,
        config: &ProtocolConfig,
    ) -> anyhow::Result<()>;
}
