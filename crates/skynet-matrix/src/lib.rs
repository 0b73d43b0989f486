//! Matrix connector (C7, third bridge alongside Telegram/Discord).
//!
//! Bridges Matrix rooms to sessions: allow-listed users/rooms, mautrix
//! bridge-ghost detection with homeserver-scoped patterns, and
//! mention-gated group responses.

pub mod allow;
pub mod bridge;
pub mod connector;
pub mod error;
pub mod mention;

pub use bridge::{BridgeInfo, BridgePatterns, RemoteChatType, BRIDGE_GHOST_PREFIXES};
pub use connector::{GroupMentionMode, MatrixConnector, MatrixConnectorConfig};
pub use error::MatrixError;
// Pairing and routing are shared across every connector; re-exported here
// for callers that only depend on skynet-matrix.
pub use skynet_channels::{ChatKind, MessageRouter, NullRouter, PairingRequest, PairingStatus, RouteRequest};
