//! Extracts structured tool calls out of a raw assistant message.
//!
//! Grammar: zero or more `<action>…</action>` blocks, each holding
//! zero or more `<invoke tool="NAME">…</invoke>`, each holding zero or more
//! `<param name="KEY">VALUE</param>`. Matching is non-greedy; `VALUE` may
//! contain `<`/`>` — only the literal `</param>` terminates it. A
//! `<![CDATA[ … ]]>` wrapper around a value is stripped before coercion.
//!
//! This is deliberately a small byte-level scan rather than a general XML
//! parser: the grammar is closed and the inputs are model-generated text, not
//! adversarial markup, so a hand-rolled scan keeps failure modes legible (see
//! [`parse`]'s doc for what "malformed" means here).

use crate::tools::core::ToolCall;
use serde_json::Value as Json;
use std::collections::HashMap;

/// Result of parsing one assistant message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    /// The text the user should see — the input with all `<action>` regions
    /// removed and surrounding whitespace trimmed.
    pub text: String,
    /// Tool calls extracted from `<action>` blocks, in document order.
    pub tool_calls: Vec<ToolCall>,
}

/// Parse an assistant message into its visible reply and its tool calls.
///
/// Malformed XML (an unclosed `<action>`, `<invoke>`, or `<param>` tag) is not
/// an error: it yields zero tool calls and the *entire* original
/// text as the reply, so the orchestrator treats the turn as terminal rather
/// than guessing at a partial parse.
pub fn parse(input: &str) -> ParseResult {
    match try_parse(input) {
        Some(result) => result,
        None => ParseResult {
            text: input.trim().to_string(),
            tool_calls: Vec::new(),
        },
    }
}

fn try_parse(input: &str) -> Option<ParseResult> {
    let mut tool_calls = Vec::new();
    let mut text = String::with_capacity(input.len());
    let mut rest = input;

    loop {
        match rest.find("<action>") {
            None => {
                text.push_str(rest);
                break;
            }
            Some(start) => {
                text.push_str(&rest[..start]);
                let after_open = &rest[start + "<action>".len()..];
                let end = after_open.find("</action>")?;
                let block = &after_open[..end];
                tool_calls.extend(parse_invokes(block)?);
                rest = &after_open[end + "</action>".len()..];
            }
        }
    }

    Some(ParseResult {
        text: text.trim().to_string(),
        tool_calls,
    })
}

fn parse_invokes(block: &str) -> Option<Vec<ToolCall>> {
    let mut calls = Vec::new();
    let mut rest = block;

    loop {
        match rest.find("<invoke") {
            None => break,
            Some(start) => {
                let after_tag_start = &rest[start..];
                let tag_end = after_tag_start.find('>')? + 1;
                let open_tag = &after_tag_start[..tag_end];
                let tool_name = extract_attr(open_tag, "tool")?;

                let after_open = &after_tag_start[tag_end..];
                let close_pos = after_open.find("</invoke>")?;
                let body = &after_open[..close_pos];

                let params = parse_params(body)?;
                calls.push(ToolCall {
                    tool: tool_name,
                    params,
                });

                rest = &after_open[close_pos + "</invoke>".len()..];
            }
        }
    }

    Some(calls)
}

fn parse_params(body: &str) -> Option<HashMap<String, Json>> {
    let mut params = HashMap::new();
    let mut rest = body;

    loop {
        match rest.find("<param") {
            None => break,
            Some(start) => {
                let after_tag_start = &rest[start..];
                let tag_end = after_tag_start.find('>')? + 1;
                let open_tag = &after_tag_start[..tag_end];
                let name = extract_attr(open_tag, "name")?;

                let after_open = &after_tag_start[tag_end..];
                let close_pos = after_open.find("</param>")?;
                let raw_value = &after_open[..close_pos];

                params.insert(name, coerce(strip_cdata(raw_value)));
                rest = &after_open[close_pos + "</param>".len()..];
            }
        }
    }

    Some(params)
}

/// Extract `name="value"` (or `name='value'`) from a tag's opening text.
fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    let needle_dq = format!("{attr}=\"");
    let needle_sq = format!("{attr}='");
    for (needle, quote) in [(&needle_dq, '"'), (&needle_sq, '\'')] {
        if let Some(pos) = tag.find(needle.as_str()) {
            let after = &tag[pos + needle.len()..];
            let end = after.find(quote)?;
            return Some(after[..end].to_string());
        }
    }
    None
}

fn strip_cdata(value: &str) -> &str {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
    {
        inner
    } else {
        trimmed
    }
}

/// Value coercion: structured data (`[`/`{` prefix) first, then
/// boolean literals, then numbers, else keep as a string.
fn coerce(value: &str) -> Json {
    let trimmed = value.trim();

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<Json>(trimmed) {
            return parsed;
        }
    }

    match trimmed {
        "true" => return Json::Bool(true),
        "false" => return Json::Bool(false),
        _ => {}
    }

    if !trimmed.is_empty() {
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                if let Some(num) = serde_json::Number::from_f64(n) {
                    return Json::Number(num);
                }
            }
        }
    }

    Json::String(value.to_string())
}

/// Serialize a native function-calling `tool_calls` list into the same
/// `<action>…</action>` textual form the parser expects, so transports that
/// surface structured tool calls still funnel through one code path.
pub fn to_action_block(calls: &[crate::ToolCall]) -> String {
    if calls.is_empty() {
        return String::new();
    }
    let mut out = String::from("<action>\n");
    for call in calls {
        let args: Json = serde_json::from_str(&call.function.arguments).unwrap_or(Json::Null);
        out.push_str(&format!("  <invoke tool=\"{}\">\n", call.function.name));
        if let Json::Object(map) = args {
            for (key, value) in map {
                let rendered = match &value {
                    Json::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push_str(&format!(
                    "    <param name=\"{key}\">{rendered}</param>\n"
                ));
            }
        }
        out.push_str("  </invoke>\n");
    }
    out.push_str("</action>");
    out
}
