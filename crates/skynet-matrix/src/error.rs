/// Errors produced by the Matrix connector.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("matrix SDK error: {0}")]
    Sdk(#[from] matrix_sdk::Error),

    #[error("matrix client builder error: {0}")]
    ClientBuild(#[from] matrix_sdk::ClientBuildError),

    #[error("no access token configured")]
    NoToken,

    #[error("message routing failed: {0}")]
    Routing(String),
}
