pub mod db;
pub mod error;
pub mod manager;
pub mod transcript;
pub mod types;

pub use error::SessionError;
pub use manager::{SessionManager, SessionStats, PENDING_SESSION_ID};
pub use transcript::{locate_transcript, reconstruct_messages, TranscriptMessage, TranscriptRoot};
pub use types::{ResumeInfo, Session, SessionKey, SessionSource};
