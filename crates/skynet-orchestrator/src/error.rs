use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Session(#[from] skynet_sessions::SessionError),
    #[error(transparent)]
    Workspace(#[from] skynet_workspaces::WorkspaceError),
    #[error(transparent)]
    Sandbox(#[from] skynet_sandbox::SandboxError),
    #[error("no turn is running for session {0}")]
    NoActiveTurn(String),
    #[error("agent runtime unavailable: {0}")]
    AgentUnavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<OrchestratorError> for skynet_core::SkynetError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Session(e) => skynet_core::SkynetError::Internal(e.to_string()),
            OrchestratorError::Workspace(e) => skynet_core::SkynetError::Internal(e.to_string()),
            OrchestratorError::Sandbox(e) => e.into(),
            OrchestratorError::NoActiveTurn(id) => {
                skynet_core::SkynetError::SessionNotFound { id }
            }
            OrchestratorError::AgentUnavailable(reason) => {
                skynet_core::SkynetError::LlmProvider(reason)
            }
            OrchestratorError::Io(e) => skynet_core::SkynetError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
