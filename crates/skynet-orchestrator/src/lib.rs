//! Orchestrator (C5): the per-turn streaming state machine.
//!
//! Composes every other core component — `skynet-capabilities` (C1),
//! `skynet-sessions` (C2), `skynet-sandbox` (C3), `skynet-permissions`
//! (C4) — into the eleven-phase turn pipeline described in `spec.md`
//! §4.5, and exposes it as a single entry point, [`Orchestrator::run_turn`],
//! that yields a normalized [`events::TurnEvent`] stream regardless of
//! whether the turn ran sandboxed or direct.

pub mod agent_runtime;
pub mod error;
pub mod events;
pub mod mapper;
pub mod systemprompt;
pub mod trust;
pub mod turn;
pub mod workdir;

pub use agent_runtime::{AgentRuntime, DirectAgentConfig};
pub use error::{OrchestratorError, Result};
pub use events::TurnEvent;
pub use turn::{CapabilityBundle, Orchestrator, TurnInput};
