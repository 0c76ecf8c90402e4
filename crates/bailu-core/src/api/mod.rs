//! API interaction layer between the orchestrator and the LLM backend.
//!
//! - [`retry`] — transient error detection (429, 5xx, network timeouts) with
//!   exponential backoff and ±25% jitter. Never retries 400/401 errors.
//! - [`streaming`] — SSE parser for incremental text, reasoning, and tool-call
//!   deltas, plus the dual-format assembly into a single `<action>` text channel.
//! - [`transport`] — the [`LlmTransport`](transport::LlmTransport) trait the
//!   orchestrator is written against; [`OpenRouterClient`](crate::OpenRouterClient)
//!   is the provided implementation.

pub mod retry;
pub mod streaming;
pub mod transport;

pub use retry::RetryConfig;
pub use transport::{LlmTransport, RetryingTransport};
