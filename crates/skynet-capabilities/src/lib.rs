//! Trust & Capability Filter (C1).
//!
//! Pure functions: given a session's trust level, a workspace's capability
//! policy, and the set of capabilities discovered on the vault, compute the
//! effective capability set the agent runtime is allowed to see. No I/O,
//! no async — everything here is a plain function over owned data.

pub mod filter;
pub mod trust;

pub use filter::{
    filter_by_trust_level, filter_capabilities, filter_plugin_dirs, CapabilitySet,
    FilteredCapabilities, McpDescriptor, PluginDirSource, WorkspaceCapabilityPolicy,
};
pub use trust::{normalize, trust_rank, TrustLevel};
