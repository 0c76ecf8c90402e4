//! The tool surface: trait, registry, and the call/result wire types shared
//! between the parser, the mediator, and the orchestrator.

use crate::error::ToolError;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Boxed future returned by [`Tool::execute`]. Lets `Tool` stay dyn-compatible
/// while each implementation's `execute` body is itself `async fn`-shaped.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

/// Default ceiling on a tool result's byte length before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Default wall-clock budget for a single tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// A single parsed tool invocation: the name the model asked for, and its
/// already-coerced arguments — value coercion happens before this type
/// is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub params: HashMap<String, Json>,
}

/// The outcome of executing a [`ToolCall`] — always returned, never raised;
/// failures are reported through `error`, not through the orchestrator's
/// control flow.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool: String,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            output: output.into(),
            error: None,
        }
    }

    pub fn err(tool: impl Into<String>, error: ToolError) -> Self {
        Self {
            tool: tool.into(),
            output: String::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A single tool: its declared shape (for injection into the system prompt
/// and for argument validation) plus its execution body.
///
/// Implementors hold whatever state they need (a workspace root, a shared
/// tracker) and are registered into a [`ToolRegistry`] behind a `Box<dyn Tool>`.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn name(&self) -> String {
        self.definition().name
    }

    /// Whether a mutation this tool performs should go through the mediator's
    /// backup-before-mutate path.
    fn is_mutation(&self) -> bool {
        false
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a>;
}

/// One parameter in a [`ToolDefinition`].
#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
}

/// The declared shape of a tool: name, human-facing description, and its
/// parameters — everything the orchestrator needs to render the tool-use
/// appendix of the system prompt and everything the registry needs to
/// validate arguments before dispatch.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    /// Build the JSON-schema `ToolDef` native function-calling transports
    /// expect, from this definition's flat parameter list: the same
    /// [`ToolDefinition`] backs both the text appendix and the `tools` field
    /// of a native chat request.
    pub fn to_tool_def(&self) -> crate::ToolDef {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            let type_name = match p.param_type {
                ParamType::String => "string",
                ParamType::Number => "number",
                ParamType::Boolean => "boolean",
            };
            properties.insert(
                p.name.clone(),
                serde_json::json!({ "type": type_name, "description": p.description }),
            );
            if p.required {
                required.push(Json::String(p.name.clone()));
            }
        }
        crate::ToolDef::new(
            self.name.clone(),
            self.description.clone(),
            serde_json::json!({
                "type": "object",
                "properties": Json::Object(properties),
                "required": Json::Array(required),
            }),
        )
    }
}

/// Render a tool's definition as the block of text the system prompt
/// appendix uses to teach the model the `<action>` grammar for this tool.
pub fn render_tool_doc(def: &ToolDefinition) -> String {
    let mut out = format!("### {}\n{}\n", def.name, def.description);
    if !def.parameters.is_empty() {
        out.push_str("Parameters:\n");
        for p in &def.parameters {
            let req = if p.required { "required" } else { "optional" };
            out.push_str(&format!(
                "- `{}` ({:?}, {}): {}\n",
                p.name, p.param_type, req, p.description
            ));
        }
    }
    out
}

/// Validate and coerce call arguments against a definition: missing required
/// parameters fail; a numeric-looking string coerces to a
/// number when the definition calls for one, and `"true"`/`"false"` coerce to
/// booleans; anything else passes through unchanged.
pub fn validate_and_coerce(
    def: &ToolDefinition,
    params: &HashMap<String, Json>,
) -> Result<HashMap<String, Json>, ToolError> {
    let mut coerced = HashMap::with_capacity(params.len());

    for spec in &def.parameters {
        match params.get(&spec.name) {
            None => {
                if spec.required {
                    return Err(ToolError::invalid_arguments(format!(
                        "missing required parameter `{}`",
                        spec.name
                    )));
                }
            }
            Some(value) => {
                coerced.insert(spec.name.clone(), coerce_to(value, spec.param_type));
            }
        }
    }

    // Pass through anything the definition didn't declare rather than reject
    // it outright — tools that accept free-form extras stay usable.
    for (key, value) in params {
        coerced.entry(key.clone()).or_insert_with(|| value.clone());
    }

    Ok(coerced)
}

fn coerce_to(value: &Json, target: ParamType) -> Json {
    match (target, value) {
        (ParamType::Number, Json::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Json::Number)
            .unwrap_or_else(|| value.clone()),
        (ParamType::Boolean, Json::String(s)) => match s.trim() {
            "true" => Json::Bool(true),
            "false" => Json::Bool(false),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Truncate a tool result to `max_bytes`, appending a notice so the model
/// knows the output was cut rather than silently short.
pub fn truncate_result(output: String, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output;
    }
    let mut end = max_bytes;
    while end > 0 && !output.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n[truncated: output exceeded {max_bytes} bytes]",
        &output[..end]
    )
}

/// The tool surface available to one run of the orchestrator: a name-indexed
/// set of [`Tool`]s plus the dispatch policy (argument validation, timeout,
/// result truncation, logging) shared by every call.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    max_result_bytes: usize,
    default_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Idempotent when called again with a tool of the same
    /// name and an identical definition (the orchestrator's pre-run setup
    /// re-registers the built-ins on every `run()`); otherwise the new
    /// registration replaces the old one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn with(mut self, tool: Box<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn is_mutation_tool(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.is_mutation()).unwrap_or(false)
    }

    /// Render the tool-use appendix for the system prompt: every
    /// registered tool's doc block, in name order.
    pub fn render_docs(&self) -> String {
        self.list()
            .iter()
            .map(render_tool_doc)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Validate, dispatch, time-box, and truncate a single call. Never
    /// panics or propagates an execution failure as a `Result::Err` — an
    /// unknown tool or a validation failure becomes an error-bearing
    /// [`ToolResult`], matching the rest of the core's "errors return to the
    /// model" posture.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.tool) else {
            warn!(tool = %call.tool, "unknown tool requested");
            return ToolResult::err(
                &call.tool,
                ToolError::invalid_arguments(format!("unknown tool `{}`", call.tool)),
            );
        };

        let def = tool.definition();
        let params = match validate_and_coerce(&def, &call.params) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(&call.tool, e),
        };

        debug!(tool = %call.tool, "executing tool call");

        match tokio::time::timeout(self.default_timeout, tool.execute(&params)).await {
            Ok(output) => ToolResult::ok(&call.tool, truncate_result(output, self.max_result_bytes)),
            Err(_) => ToolResult::err(
                &call.tool,
                ToolError::timeout(format!(
                    "`{}` did not complete within {:?}",
                    call.tool, self.default_timeout
                )),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Tool for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "echoes its `text` parameter".into(),
                parameters: vec![ToolParameter {
                    name: "text".into(),
                    param_type: ParamType::String,
                    description: "text to echo".into(),
                    required: true,
                }],
            }
        }

        fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
            Box::pin(async move {
                params
                    .get("text")
                    .and_then(Json::as_str)
                    .unwrap_or_default()
                    .to_string()
            })
        }
    }

    fn call(tool: &str, params: &[(&str, Json)]) -> ToolCall {
        ToolCall {
            tool: tool.to_string(),
            params: params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let registry = ToolRegistry::new().with(Box::new(Echo));
        let result = registry.execute(&call("echo", &[("text", Json::String("hi".into()))])).await;
        assert_eq!(result.output, "hi");
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result_not_a_panic() {
        let registry = ToolRegistry::new();
        let result = registry.execute(&call("nope", &[])).await;
        assert!(result.is_error());
        assert!(result.error.unwrap().starts_with("invalid-arguments"));
    }

    #[tokio::test]
    async fn missing_required_param_is_invalid_arguments() {
        let registry = ToolRegistry::new().with(Box::new(Echo));
        let result = registry.execute(&call("echo", &[])).await;
        assert!(result.is_error());
        assert!(result.error.unwrap().contains("missing required parameter"));
    }

    #[test]
    fn coerces_numeric_string_to_number() {
        let def = ToolDefinition {
            name: "t".into(),
            description: String::new(),
            parameters: vec![ToolParameter {
                name: "n".into(),
                param_type: ParamType::Number,
                description: String::new(),
                required: true,
            }],
        };
        let params = HashMap::from([("n".to_string(), Json::String("42".into()))]);
        let coerced = validate_and_coerce(&def, &params).unwrap();
        assert_eq!(coerced.get("n"), Some(&Json::from(42.0)));
    }

    #[test]
    fn coerces_boolean_string() {
        let def = ToolDefinition {
            name: "t".into(),
            description: String::new(),
            parameters: vec![ToolParameter {
                name: "b".into(),
                param_type: ParamType::Boolean,
                description: String::new(),
                required: true,
            }],
        };
        let params = HashMap::from([("b".to_string(), Json::String("true".into()))]);
        let coerced = validate_and_coerce(&def, &params).unwrap();
        assert_eq!(coerced.get("b"), Some(&Json::Bool(true)));
    }

    #[test]
    fn truncate_result_appends_notice_when_over_budget() {
        let long = "x".repeat(100);
        let truncated = truncate_result(long, 10);
        assert!(truncated.starts_with("xxxxxxxxxx"));
        assert!(truncated.contains("[truncated"));
    }

    #[test]
    fn truncate_result_is_noop_under_budget() {
        assert_eq!(truncate_result("short".into(), 100), "short");
    }

    #[test]
    fn to_tool_def_marks_required_params() {
        let def = ToolDefinition {
            name: "read_file".into(),
            description: "reads a file".into(),
            parameters: vec![ToolParameter {
                name: "path".into(),
                param_type: ParamType::String,
                description: "file path".into(),
                required: true,
            }],
        };
        let tool_def = def.to_tool_def();
        assert_eq!(tool_def.function.name, "read_file");
        assert_eq!(
            tool_def.function.parameters["required"],
            serde_json::json!(["path"])
        );
    }

    #[test]
    fn register_is_idempotent_under_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));
        registry.register(Box::new(Echo));
        assert_eq!(registry.len(), 1);
    }
}
