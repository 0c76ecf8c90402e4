//! The tool surface: capability units the orchestrator can invoke on the
//! model's behalf, gated by the mediator for anything that mutates.
//!
//! # Submodules
//!
//! - [`core`] — the [`Tool`](core::Tool) trait, [`ToolRegistry`](core::ToolRegistry),
//!   and the [`ToolCall`](core::ToolCall)/[`ToolResult`](core::ToolResult) wire types.
//! - [`common`] — the five built-in tools: `read_file`, `list_directory`,
//!   `write_file`, `apply_diff`, `run_command`.
//! - [`spec`] — [`ToolSpec`](spec::ToolSpec) builder for structured, richly
//!   documented tool descriptions.

pub mod common;
pub mod core;
pub mod spec;

pub use core::{
    ParamType, Tool, ToolCall, ToolDefinition, ToolFuture, ToolParameter, ToolRegistry, ToolResult,
    DEFAULT_MAX_RESULT_BYTES, truncate_result,
};
