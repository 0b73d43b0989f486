use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace not found: {0}")]
    NotFound(String),
    #[error("workspace already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid workspace slug: {0}")]
    InvalidSlug(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown trust level: {0}")]
    UnknownTrustLevel(#[from] skynet_capabilities::trust::UnknownTrustLevel),
}
