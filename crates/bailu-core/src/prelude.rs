//! Convenience re-exports for common `bailu-core` types.
//!
//! Meant to be glob-imported when embedding the orchestrator:
//!
//! ```ignore
//! use bailu_core::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of callers: the
//! [`OpenRouterClient`]/[`LlmTransport`], [`Message`] constructors,
//! [`Orchestrator`] + config, the [`Tool`] trait + [`ToolRegistry`] + built-in
//! tools, the [`SafetyMediator`] + approval types, and session persistence.
//! Specialized types (the parser's internals, the diff renderer) are
//! intentionally excluded — import those from their modules directly.

// ── Core wire types ─────────────────────────────────────────────────
pub use crate::{ChatRequest, Message, MessageRole, OpenRouterClient, Plugin, ToolDef, json_schema_for};

// ── Conversation store ──────────────────────────────────────────────
pub use crate::conversation::Conversation;

// ── Error type ───────────────────────────────────────────────────────
pub use crate::error::{ErrorCode, ToolError};

// ── Transport ────────────────────────────────────────────────────────
pub use crate::api::transport::{LlmTransport, RetryingTransport};
pub use crate::api::retry::RetryConfig;

// ── Tool-call parsing ────────────────────────────────────────────────
pub use crate::parser::{ParseResult, parse};

// ── Tool surface ─────────────────────────────────────────────────────
pub use crate::tools::common::{resolve_in_workdir, ApplyDiff, ListDirectory, ReadFile, RunCommand, WriteFile};
pub use crate::tools::core::{ParamType, Tool, ToolCall, ToolDefinition, ToolParameter, ToolRegistry, ToolResult};

// ── Safety mediator ──────────────────────────────────────────────────
pub use crate::mediator::{ApprovalDecision, ApprovalPrompt, ApprovalRequest, NoopPrompt, SafetyMediator, SafetyMode};

// ── Orchestrator ─────────────────────────────────────────────────────
pub use crate::orchestrator::{Orchestrator, OrchestratorConfig, RunOutput};

// ── Session persistence & run settings ──────────────────────────────
pub use crate::agent::{OrchestratorSettings, SessionManager, SessionManifest, SessionStatus};
