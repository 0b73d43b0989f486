use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("docker is not available on this host")]
    DockerUnavailable,
    #[error("invalid session id for container name: {0}")]
    InvalidSessionId(String),
    #[error("sandbox turn timed out after {0}s")]
    Timeout(u64),
    #[error("container exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

impl From<SandboxError> for skynet_core::SkynetError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::DockerUnavailable => skynet_core::SkynetError::SandboxUnavailable {
                reason: "docker is not available on this host".to_string(),
            },
            other => skynet_core::SkynetError::SandboxUnavailable {
                reason: other.to_string(),
            },
        }
    }
}
