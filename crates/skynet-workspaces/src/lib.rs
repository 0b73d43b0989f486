//! Workspace CRUD and YAML persistence.
//!
//! A workspace is a named pin of working directory, trust floor, and
//! capability policy under `.parachute/workspaces/{slug}/config.yaml`.
//! Sessions and connectors reference a workspace by slug rather than
//! repeating these three settings on every request.

pub mod error;
pub mod model;
pub mod store;

pub use error::WorkspaceError;
pub use model::{SandboxPolicy, WorkspaceConfig, WorkspaceCreate, WorkspaceUpdate};
pub use store::{generate_slug, validate_slug, WorkspaceStore};
