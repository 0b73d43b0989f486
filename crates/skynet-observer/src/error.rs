use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("task queue is shutting down")]
    QueueClosed,
    #[error("analyzer model call failed: {0}")]
    ModelCall(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session store error: {0}")]
    Session(#[from] skynet_sessions::SessionError),
}

pub type Result<T> = std::result::Result<T, ObserverError>;
