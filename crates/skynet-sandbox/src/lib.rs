//! Sandbox Controller (C3): runs a turn inside a restricted, single-use
//! Docker container instead of the host agent runtime.

pub mod config;
pub mod docker;
pub mod error;

pub use config::AgentSandboxConfig;
pub use docker::{DockerSandbox, DEFAULT_CPU_LIMIT, DEFAULT_MEMORY_LIMIT, DEFAULT_SANDBOX_IMAGE};
pub use error::SandboxError;
