//! Permission Broker (C4): interactive question tracking and per-tool
//! trust gating.

pub mod broker;
pub mod error;
pub mod policy;

pub use broker::{DenialRecord, PendingQuestion, PermissionBroker, QuestionAnswer};
pub use error::PermissionError;
pub use policy::{ToolDecision, ToolTrustPolicy};
