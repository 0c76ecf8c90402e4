//! Core control loop for an interactive coding-agent terminal.
//!
//! `bailu-core` provides the agent's control loop: a [`Conversation`](conversation::Conversation)
//! of messages, a [`ToolRegistry`](tools::core::ToolRegistry) of dispatchable capabilities, a
//! [`parser::parse`] function that extracts structured tool calls from a streamed assistant
//! message, a [`SafetyMediator`](mediator::SafetyMediator) that enforces the safety policy around
//! every mutating call, and an [`Orchestrator`](orchestrator::Orchestrator) that drives the whole
//! loop to completion.
//!
//! # Where to find things
//!
//! - **Run the agent loop:** [`Orchestrator`](orchestrator::Orchestrator) and
//!   [`OrchestratorConfig`](orchestrator::OrchestratorConfig).
//! - **Define or register tools:** the [`Tool`](tools::core::Tool) trait and
//!   [`ToolRegistry`](tools::core::ToolRegistry); built-ins live in [`tools::common`].
//! - **Safety policy:** [`SafetyMediator`](mediator::SafetyMediator), [`SafetyMode`](mediator::SafetyMode),
//!   and [`ApprovalPrompt`](mediator::ApprovalPrompt).
//! - **Parse tool calls out of assistant text:** [`parser::parse`].
//! - **Conversation state and compression:** [`Conversation`](conversation::Conversation).
//! - **Talk to the LLM:** [`OpenRouterClient`] for non-streaming/streaming chat completions.
//! - **Persist sessions:** [`agent::session::SessionManager`].
//!
//! # Design principles
//!
//! 1. **The model proposes, the mediator disposes.** Every mutating tool call passes through
//!    the safety mediator before it touches the filesystem or a shell.
//! 2. **Tools are the unit of capability.** Every agent capability is a
//!    [`Tool`](tools::core::Tool) implementor with a declared parameter list and a `safe` flag.
//! 3. **Context is a scarce, estimated resource.** The conversation store tracks a cheap token
//!    estimate and compresses itself rather than growing unbounded.
//! 4. **Errors come back to the model, not up the stack.** A failing tool call is a message the
//!    model gets to read and react to, not a Rust error that unwinds the orchestrator.

pub mod agent;
pub mod api;
pub mod conversation;
pub mod error;
pub mod mediator;
pub mod orchestrator;
pub mod parser;
pub mod prelude;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// Re-export schemars for downstream crates building typed tool parameters.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model used when nothing else configures one.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

/// Maximum tokens for lightweight, non-interactive preprocessing calls.
pub const PREPROCESSING_MAX_TOKENS: u32 = 1024;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust tool-argument
/// types and the schema the tool-call contract documents to the model.
///
/// # Example
///
/// ```
/// use bailu_core::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ReadFileArgs {
///     path: String,
///     #[serde(default)]
///     offset: Option<u32>,
/// }
///
/// let schema = json_schema_for::<ReadFileArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"path".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Superset of fields supported by the
/// OpenRouter-compatible API — unused optional fields are omitted from serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderPreferences>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<Plugin>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,

    /// Set by the streaming path only; never constructed directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Reasoning effort level for extended-thinking models.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    High,
    Medium,
    Low,
    None,
}

/// Configuration for extended thinking / reasoning tokens.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReasoningConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<bool>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// JSON output format type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
}

/// JSON output mode.
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
}

/// Provider routing preferences.
#[derive(Serialize, Debug)]
pub struct ProviderPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_fallbacks: Option<bool>,
}

// ── Plugin types ───────────────────────────────────────────────────

/// A strongly-typed transport plugin configuration, passed through verbatim
/// to providers that understand it.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "id")]
pub enum Plugin {
    #[serde(rename = "web")]
    Web {
        #[serde(skip_serializing_if = "Option::is_none")]
        max_results: Option<u32>,
    },
    #[serde(rename = "file-parser")]
    FileParser {
        #[serde(skip_serializing_if = "Option::is_none")]
        pdf: Option<FileParserPdfConfig>,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FileParserPdfConfig {
    pub engine: String,
}

impl Plugin {
    pub fn web() -> Self {
        Plugin::Web { max_results: None }
    }

    pub fn id(&self) -> &str {
        match self {
            Plugin::Web { .. } => "web",
            Plugin::FileParser { .. } => "file-parser",
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation: exactly these four roles, never
/// more.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// `tool_calls`/`tool_call_id` are wire-transport detail (the native
/// function-calling channel some providers use); the orchestrator itself only
/// ever reasons about `role` and `content` — see [`parser`] for how a native
/// `tool_calls` payload is folded back into `content` as an action block
/// before the orchestrator sees it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Rough token estimate for this message alone, per the conversation
    /// store's cost model: `1.5` per CJK-range character plus `0.25`
    /// per ascii word.
    pub fn estimate_tokens(&self) -> f32 {
        conversation::estimate_tokens(self.content.as_deref().unwrap_or(""))
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the model (function-calling wire format). This is
/// the transport-facing projection of [`tools::core::ToolDefinition`].
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call as the native function-calling channel represents it. The
/// text-based parser is the single source of truth for the orchestrator's own
/// [`tools::core::ToolCall`]; this type only exists at the transport boundary.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
    annotations: Option<Vec<Annotation>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`OpenRouterClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageInfo>,
    pub annotations: Vec<Annotation>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// URL citation annotation returned by a web-search plugin.
#[derive(Deserialize, Debug)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub annotation_type: Option<String>,
    pub url_citation: Option<UrlCitation>,
}

#[derive(Deserialize, Debug)]
pub struct UrlCitation {
    pub url: String,
    pub title: Option<String>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenRouter-compatible chat completions API.
///
/// This is the concrete transport behind [`api::transport::LlmTransport`];
/// most callers should depend on that trait rather than this type directly.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) referer: String,
    pub(crate) title: String,
    model: std::sync::RwLock<String>,
}

impl OpenRouterClient {
    /// Create a new client with the given API key, default base URL, and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_base_url(api_key, OPENROUTER_URL)
    }

    /// Create a new client against a custom base URL (e.g. a self-hosted gateway).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("bailu-core/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            referer: "https://github.com/bailu-term/bailu".into(),
            title: "bailu".into(),
            model: std::sync::RwLock::new(DEFAULT_MODEL.to_string()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The model this client currently targets — changed by the `/model`
    /// slash command, read by every `quick_completion`-style auxiliary call
    /// that doesn't carry its own explicit model.
    pub fn model(&self) -> String {
        self.model.read().unwrap().clone()
    }

    pub fn set_model(&self, model: impl Into<String>) {
        *self.model.write().unwrap() = model.into();
    }

    /// Send a non-streaming chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        let msg_count = body.messages.len();
        let tool_count = body.tools.as_ref().map_or(0, |t| t.len());
        debug!(
            "LLM request: model={:?}, messages={}, tools={}, max_tokens={}",
            body.model, msg_count, tool_count, body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        let elapsed = start.elapsed();
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            elapsed.as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("API error: {}", err.message));
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        match choice {
            Some(c) => Ok(ChatCompletion {
                content: c.message.content,
                tool_calls: c.message.tool_calls.unwrap_or_default(),
                usage: parsed.usage,
                annotations: c.message.annotations.unwrap_or_default(),
                finish_reason: c.finish_reason,
            }),
            None => Ok(ChatCompletion {
                content: None,
                tool_calls: vec![],
                usage: parsed.usage,
                annotations: vec![],
                finish_reason: None,
            }),
        }
    }
}

// ── Convenience ────────────────────────────────────────────────────

/// Run a quick one-shot completion, used for auxiliary calls (e.g. commit-message
/// drafting) that don't need the full orchestrator loop.
pub async fn quick_completion(system: &str, user: &str, model: &str) -> Result<String, String> {
    let api_key = std::env::var("API_KEY").map_err(|_| "API_KEY not set".to_string())?;
    let client = OpenRouterClient::new(api_key)?;

    let body = ChatRequest {
        model: Some(model.to_string()),
        messages: vec![Message::system(system), Message::user(user)],
        max_tokens: PREPROCESSING_MAX_TOKENS,
        temperature: 0.3,
        ..Default::default()
    };

    let completion = client.chat(&body).await?;
    completion
        .content
        .ok_or_else(|| "empty LLM response".to_string())
}

/// Format web-search URL citations as a "Sources:" footer.
pub fn format_citations(annotations: &[Annotation]) -> String {
    let citations: Vec<String> = annotations
        .iter()
        .filter(|a| a.annotation_type.as_deref() == Some("url_citation"))
        .filter_map(|a| {
            a.url_citation.as_ref().map(|c| {
                let title = c.title.as_deref().unwrap_or(&c.url);
                format!("- [{title}]({})", c.url)
            })
        })
        .collect();

    let mut seen = std::collections::HashSet::new();
    let unique: Vec<&str> = citations
        .iter()
        .filter(|c| seen.insert(c.as_str()))
        .map(|c| c.as_str())
        .collect();

    if unique.is_empty() {
        String::new()
    } else {
        format!("\n\nSources:\n{}", unique.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content.as_deref(), Some("hello"));

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let tool = Message::tool_result("call-1", "result");
        assert_eq!(tool.role, MessageRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn chat_request_default_skips_none_fields() {
        let req = ChatRequest {
            model: Some("test-model".into()),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            temperature: 0.5,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("top_p").is_none());
        assert!(json.get("tools").is_none());
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn format_citations_deduplicates() {
        let anns = vec![
            Annotation {
                annotation_type: Some("url_citation".into()),
                url_citation: Some(UrlCitation {
                    url: "https://example.com".into(),
                    title: Some("Example".into()),
                }),
            },
            Annotation {
                annotation_type: Some("url_citation".into()),
                url_citation: Some(UrlCitation {
                    url: "https://example.com".into(),
                    title: Some("Example".into()),
                }),
            },
        ];
        let result = format_citations(&anns);
        assert_eq!(result.matches("example.com").count(), 1, "should deduplicate");
    }
}
