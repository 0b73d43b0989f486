use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("no pending permission request with id {0}")]
    RequestNotFound(String),
    #[error("permission request {0} was already resolved")]
    AlreadyResolved(String),
}

pub type Result<T> = std::result::Result<T, PermissionError>;
