pub mod assets;
pub mod channel;
pub mod error;
pub mod history;
pub mod manager;
pub mod pairing;
pub mod router;
pub mod runtime;
pub mod transcribe;
pub mod types;

pub use channel::Channel;
pub use error::ChannelError;
pub use history::{GroupHistory, GroupHistoryEntry};
pub use manager::ChannelManager;
pub use pairing::{PairingRequest, PairingStatus};
pub use router::{ChatKind, MessageRouter, NullRouter, RouteRequest};
pub use runtime::ConnectorRuntime;
pub use transcribe::{Transcriber, WhisperBackend, WhisperTranscriber};
pub use types::{ChannelStatus, InboundMessage, MessageFormat, OutboundMessage};
