//! Shared types, configuration, and error taxonomy used across every
//! `skynet-*` crate: the wire-protocol constants, the `SkynetError`
//! taxonomy (§7 of the design), reminder delivery payloads, and the
//! self-update helpers shared by the gateway and CLI.

pub mod config;
pub mod error;
pub mod reminder;
pub mod types;
pub mod update;

pub use error::{Result, SkynetError};
