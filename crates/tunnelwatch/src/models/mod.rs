//! Data model shared by the store, the probes and the coordinator.

pub mod protocol;
pub mod status;

pub use protocol::{ClientCommand, ProtocolConfig, ProtocolKind, Transport};
pub use status::{CheckResult, CheckStatus, ProtocolOverview, StatusCounts, Subscriber};
