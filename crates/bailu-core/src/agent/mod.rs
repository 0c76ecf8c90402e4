//! Supporting state for the agent loop that lives outside the orchestrator
//! itself: run configuration and on-disk session persistence.
//!
//! - [`config::OrchestratorSettings`] — model/round/token defaults loaded
//!   from workspace configuration, turned into an
//!   [`OrchestratorConfig`](crate::orchestrator::OrchestratorConfig).
//! - [`session::SessionManager`] — per-session directories with a manifest
//!   and message history, written together so they never diverge.

pub mod config;
pub mod session;

pub use config::OrchestratorSettings;
pub use session::{SessionManager, SessionManifest, SessionStatus};
