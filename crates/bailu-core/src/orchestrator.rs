//! The iteration driver: one instance per `run(initialMessages)` call.
//!
//! Pulls together the [`Conversation`](crate::conversation::Conversation) store, the
//! [`LlmTransport`](crate::api::transport::LlmTransport) the assistant message comes from,
//! [`parser::parse`](crate::parser::parse) to pull tool calls out of that message, and the
//! [`SafetyMediator`](crate::mediator::SafetyMediator) to dispatch them. The mediator owns
//! approval/backup/rollback directly, so the orchestrator's own loop only has to track
//! iteration count, consecutive failures, and termination conditions.

use crate::conversation::Conversation;
use crate::mediator::SafetyMediator;
use crate::mediator::SafetyMode;
use crate::tools::core::{ToolCall, ToolResult};
use crate::{ChatRequest, Message};

const TOOL_APPENDIX_HEADER: &str = "## Tool use\n\n\
You may call tools by emitting an `<action>` block containing one or more \
`<invoke tool=\"NAME\"><param name=\"KEY\">VALUE</param>...</invoke>` elements. \
Text outside `<action>` blocks is shown to the user; text inside is not. \
Available tools:\n\n";

const MEMORY_HEADER: &str = "## Working memory\n\n";

/// Iteration limits and model parameters for one `run()`.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Hard stop on the number of iterations.
    pub sanity_ceiling: u32,
    /// Log a warning once iterations cross this count, for callers who raise
    /// `sanity_ceiling` well past its default.
    pub warn_above_iterations: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.3,
            sanity_ceiling: 100,
            warn_above_iterations: 1000,
        }
    }
}

/// The output contract of a `run()`: `messages` excludes the system
/// message so an embedding REPL can append it to its own history verbatim.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub success: bool,
    pub final_response: String,
    pub iterations: u32,
    pub tool_calls_executed: u32,
    pub error: Option<String>,
    pub messages: Vec<Message>,
}

/// Drives the model/tool loop to completion for one conversation.
pub struct Orchestrator<'a> {
    transport: &'a dyn crate::api::transport::LlmTransport,
    mediator: SafetyMediator,
    config: OrchestratorConfig,
    display: Box<dyn Fn(&str) + Send + Sync>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        transport: &'a dyn crate::api::transport::LlmTransport,
        mediator: SafetyMediator,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            transport,
            mediator,
            config,
            display: Box::new(|_| {}),
        }
    }

    /// Set the sink non-action tokens stream to as they arrive. `bailu-cli`
    /// wires this to its terminal writer.
    pub fn with_display(mut self, display: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.display = Box::new(display);
        self
    }

    /// The mediator's current safety mode — surfaced so a REPL's `/safety`
    /// query can report it without holding its own copy that could drift.
    pub fn safety_mode(&self) -> SafetyMode {
        self.mediator.mode()
    }

    /// Change the mediator's safety mode in place, e.g. from a REPL's
    /// `/safety` command. Takes effect on the next dispatched tool call.
    pub fn set_safety_mode(&mut self, mode: SafetyMode) {
        self.mediator.set_mode(mode);
    }

    pub async fn run(&self, mut conversation: Conversation) -> RunOutput {
        let base_system = conversation
            .messages()
            .first()
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        let mut touched_paths: Vec<String> = Vec::new();
        let mut last_directory_listing: Option<String> = None;

        let mut iterations: u32 = 0;
        let mut tool_calls_executed: u32 = 0;
        let mut last_failed_tool: Option<String> = None;
        let mut consecutive_failures: u32 = 0;

        loop {
            iterations += 1;

            if conversation.should_auto_compress() {
                conversation.compress();
            }

            self.refresh_system_appendix(&mut conversation, &base_system, &touched_paths, last_directory_listing.as_deref());

            let request = self.build_request(&conversation);

            let mut filter = ActionBlockFilter::new(self.display.as_ref());
            let text = match self
                .transport
                .chat_stream_text_live(&request, &mut |delta| filter.feed(delta))
                .await
            {
                Ok(t) => {
                    filter.finish();
                    t
                }
                Err(e) => {
                    return RunOutput {
                        success: false,
                        final_response: String::new(),
                        iterations,
                        tool_calls_executed,
                        error: Some(e),
                        messages: conversation.messages_excluding_system().to_vec(),
                    };
                }
            };

            let parsed = crate::parser::parse(&text);

            if parsed.tool_calls.is_empty() {
                conversation.push(Message::assistant_text(text));
                return RunOutput {
                    success: true,
                    final_response: parsed.text,
                    iterations,
                    tool_calls_executed,
                    error: None,
                    messages: conversation.messages_excluding_system().to_vec(),
                };
            }

            conversation.push(Message::assistant_text(text));

            let results = self.mediator.dispatch_turn(&parsed.tool_calls).await;
            tool_calls_executed += results.len() as u32;

            record_memory(&parsed.tool_calls, &results, &mut touched_paths, &mut last_directory_listing);

            for (call, result) in parsed.tool_calls.iter().zip(&results) {
                if result.is_error() {
                    if last_failed_tool.as_deref() == Some(call.tool.as_str()) {
                        consecutive_failures += 1;
                    } else {
                        last_failed_tool = Some(call.tool.clone());
                        consecutive_failures = 1;
                    }
                } else {
                    last_failed_tool = None;
                    consecutive_failures = 0;
                }
            }

            conversation.push(Message::user(render_tool_results(&parsed.tool_calls, &results)));

            if consecutive_failures >= 3 {
                return RunOutput {
                    success: true,
                    final_response: format!(
                        "Stopped after `{}` failed {} times in a row.",
                        last_failed_tool.unwrap_or_default(),
                        consecutive_failures
                    ),
                    iterations,
                    tool_calls_executed,
                    error: None,
                    messages: conversation.messages_excluding_system().to_vec(),
                };
            }

            if self.mediator.mode() == SafetyMode::DryRun && iterations == 1 {
                return RunOutput {
                    success: true,
                    final_response: "Dry run: no changes were made.".to_string(),
                    iterations,
                    tool_calls_executed,
                    error: None,
                    messages: conversation.messages_excluding_system().to_vec(),
                };
            }

            if iterations >= self.config.sanity_ceiling {
                return RunOutput {
                    success: true,
                    final_response: "Stopped: reached the maximum number of iterations.".to_string(),
                    iterations,
                    tool_calls_executed,
                    error: None,
                    messages: conversation.messages_excluding_system().to_vec(),
                };
            }

            if iterations == self.config.warn_above_iterations {
                tracing::warn!(iterations, "orchestrator: unusually long run");
            }
        }
    }

    fn build_request(&self, conversation: &Conversation) -> ChatRequest {
        ChatRequest {
            model: Some(self.config.model.clone()),
            messages: conversation.messages().to_vec(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            ..Default::default()
        }
    }

    fn refresh_system_appendix(
        &self,
        conversation: &mut Conversation,
        base_system: &str,
        touched_paths: &[String],
        last_directory_listing: Option<&str>,
    ) {
        let tool_docs = self.mediator.registry().render_docs();
        let memory = render_memory_section(touched_paths, last_directory_listing);

        let mut content = base_system.to_string();
        content.push_str("\n\n");
        content.push_str(TOOL_APPENDIX_HEADER);
        content.push_str(&tool_docs);
        content.push_str("\n\n");
        content.push_str(MEMORY_HEADER);
        content.push_str(&memory);

        conversation.set_system(content);
    }
}

fn render_memory_section(touched_paths: &[String], last_directory_listing: Option<&str>) -> String {
    let mut out = String::new();
    if touched_paths.is_empty() {
        out.push_str("No files touched yet this conversation.\n");
    } else {
        out.push_str("Files touched so far: ");
        out.push_str(&touched_paths.join(", "));
        out.push('\n');
    }
    if let Some(listing) = last_directory_listing {
        out.push_str("Last directory listing:\n");
        out.push_str(listing);
    }
    out
}

fn record_memory(
    calls: &[ToolCall],
    results: &[ToolResult],
    touched_paths: &mut Vec<String>,
    last_directory_listing: &mut Option<String>,
) {
    for (call, result) in calls.iter().zip(results) {
        if result.is_error() {
            continue;
        }
        match call.tool.as_str() {
            "write_file" | "apply_diff" => {
                if let Some(path) = call.params.get("path").and_then(|v| v.as_str()) {
                    if !touched_paths.iter().any(|p| p == path) {
                        touched_paths.push(path.to_string());
                    }
                }
            }
            "list_directory" => {
                *last_directory_listing = Some(result.output.clone());
            }
            _ => {}
        }
    }
}

/// Render a turn's tool results as a single user-role message body: one
/// tagged block per result, in call order.
fn render_tool_results(calls: &[ToolCall], results: &[ToolResult]) -> String {
    let mut out = String::new();
    for (call, result) in calls.iter().zip(results) {
        out.push_str(&format!("<tool_result tool=\"{}\">\n", call.tool));
        if let Some(err) = &result.error {
            out.push_str("ERROR: ");
            out.push_str(err);
            out.push('\n');
        } else {
            out.push_str(&result.output);
            out.push('\n');
        }
        out.push_str("</tool_result>\n");
    }
    out
}

/// Buffers text deltas while inside an `<action>…</action>` region so it's
/// never shown mid-stream, and writes a one-time `Bailu: ` prefix before the
/// first visible token of a turn.
struct ActionBlockFilter<'p> {
    printer: &'p (dyn Fn(&str) + Send + Sync),
    pending: String,
    inside_action: bool,
    prefix_emitted: bool,
}

/// Longest of the two tag literals, minus one: the widest partial match we
/// might need to hold back across a chunk boundary.
const TAG_HOLDBACK: usize = "</action>".len() - 1;

impl<'p> ActionBlockFilter<'p> {
    fn new(printer: &'p (dyn Fn(&str) + Send + Sync)) -> Self {
        Self {
            printer,
            pending: String::new(),
            inside_action: false,
            prefix_emitted: false,
        }
    }

    fn feed(&mut self, delta: &str) {
        self.pending.push_str(delta);
        loop {
            if self.inside_action {
                match self.pending.find("</action>") {
                    Some(pos) => {
                        self.pending.drain(..pos + "</action>".len());
                        self.inside_action = false;
                    }
                    None => break,
                }
            } else if let Some(pos) = self.pending.find("<action>") {
                let visible = self.pending[..pos].to_string();
                self.pending.drain(..pos + "<action>".len());
                self.inside_action = true;
                self.emit(&visible);
            } else {
                let keep = TAG_HOLDBACK.min(self.pending.len());
                let emit_len = self.pending.len() - keep;
                if emit_len == 0 {
                    break;
                }
                let visible = self.pending[..emit_len].to_string();
                self.pending.drain(..emit_len);
                self.emit(&visible);
                break;
            }
        }
    }

    /// Flush anything left in the buffer once the stream ends. Only relevant
    /// if the response ended outside an `<action>` block with a trailing
    /// fragment still held back for boundary safety.
    fn finish(&mut self) {
        if !self.inside_action && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest);
        }
    }

    fn emit(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.prefix_emitted {
            (self.printer)("Bailu: ");
            self.prefix_emitted = true;
        }
        (self.printer)(text);
    }
}
