//! The five built-in tools: `read_file`, `list_directory`, `write_file`,
//! `apply_diff`, `run_command`.
//!
//! Every tool here is rooted at a fixed `workdir` (the workspace root) and
//! rejects any path argument that escapes it — `../`, `..\`, and the
//! URL-encoded `%2e%2e` are all treated the same way: reject, then normalize
//! and confirm the result stays a descendant of `workdir` before touching the
//! filesystem.

use crate::error::{ErrorCode, ToolError};
use crate::tools::core::{ParamType, Tool, ToolDefinition, ToolFuture, ToolParameter};
use crate::tools::spec::ToolSpec;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

pub const DEFAULT_READ_LINE_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 500;
const DEFAULT_LIST_DIR_DEPTH: usize = 2;
const DEFAULT_LIST_DIR_LIMIT: usize = 200;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_BLOCKED_COMMAND_PREFIXES: &[&str] =
    &["rm -rf /", "mkfs", "dd if=", ":(){ :|:& };:", "shutdown", "reboot"];

/// Reject `..`, `..\`, and the percent-encoded `%2e%2e`, then resolve `path`
/// against `workdir` and confirm the result is still a descendant of it.
///
/// This runs before the filesystem call it guards, not after — a symlink or
/// a later normalization quirk never gets a chance to smuggle a traversal in.
pub fn resolve_in_workdir(workdir: &str, path: &str) -> Result<PathBuf, ToolError> {
    let lowered = path.to_lowercase();
    if lowered.contains("..") || lowered.contains("%2e%2e") {
        return Err(ToolError::path_violation(format!(
            "path `{path}` contains a traversal segment"
        )));
    }

    let workdir = Path::new(workdir);
    let joined = workdir.join(path);
    let normalized = normalize(&joined);
    let normalized_root = normalize(workdir);

    if !normalized.starts_with(&normalized_root) {
        return Err(ToolError::path_violation(format!(
            "path `{path}` escapes the workspace root"
        )));
    }

    Ok(normalized)
}

/// Lexical normalization (no filesystem access, so it works for paths that
/// don't exist yet — e.g. a `write_file` target).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn get_str<'a>(params: &'a HashMap<String, Json>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Json::as_str)
}

fn get_u64(params: &HashMap<String, Json>, key: &str) -> Option<u64> {
    params.get(key).and_then(Json::as_u64)
}

fn required_string(params: &HashMap<String, Json>, key: &str) -> Result<String, ToolError> {
    get_str(params, key)
        .map(str::to_string)
        .ok_or_else(|| ToolError::invalid_arguments(format!("missing required parameter `{key}`")))
}

fn as_tool_result(tool: &str, result: Result<String, ToolError>) -> String {
    match result {
        Ok(s) => s,
        Err(e) => e.to_string(),
    }
}

// ── read_file ─────────────────────────────────────────────────────────

/// Read a file (or a line range within it) under the workspace root.
pub struct ReadFile {
    workdir: String,
}

impl ReadFile {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for ReadFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: ToolSpec::builder("read_file")
                .purpose("Read a file's contents, optionally a line range, from the workspace")
                .when_to_use("When you need to see the contents of a known file path")
                .when_not_to_use(
                    "When you only know a pattern to search for — use shell via run_command, \
                     or list_directory to discover the path first",
                )
                .parameters(serde_json::json!({}))
                .example(
                    "read_file(path='src/lib.rs')",
                    "L1: //! crate doc\nL2: \n...",
                )
                .output_format("Line-numbered content as `L{n}: {line}`, paginated by offset/limit")
                .build()
                .to_description(),
            parameters: vec![
                ToolParameter {
                    name: "path".into(),
                    param_type: ParamType::String,
                    description: "path relative to the workspace root".into(),
                    required: true,
                },
                ToolParameter {
                    name: "offset".into(),
                    param_type: ParamType::Number,
                    description: "1-based line number to start from (default 1)".into(),
                    required: false,
                },
                ToolParameter {
                    name: "limit".into(),
                    param_type: ParamType::Number,
                    description: "maximum number of lines to return (default 2000)".into(),
                    required: false,
                },
            ],
        }
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
        let workdir = self.workdir.clone();
        Box::pin(async move { as_tool_result("read_file", read_file_impl(&workdir, params).await) })
    }
}

async fn read_file_impl(workdir: &str, params: &HashMap<String, Json>) -> Result<String, ToolError> {
    let path = required_string(params, "path")?;
    let full_path = resolve_in_workdir(workdir, &path)?;

    let metadata = fs::metadata(&full_path)
        .await
        .map_err(|e| ToolError::from_io(&e, &format!("reading {path}")))?;
    if metadata.is_dir() {
        return Err(ToolError::invalid_arguments(format!(
            "`{path}` is a directory; use list_directory instead"
        )));
    }

    let content = fs::read_to_string(&full_path)
        .await
        .map_err(|e| ToolError::from_io(&e, &format!("reading {path}")))?;

    let offset = get_u64(params, "offset").unwrap_or(1).max(1) as usize - 1;
    let limit = get_u64(params, "limit").unwrap_or(DEFAULT_READ_LINE_LIMIT as u64) as usize;

    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    let page = lines.iter().skip(offset).take(limit);

    let mut out = String::new();
    for (i, line) in page.enumerate() {
        let line_no = offset + i + 1;
        if line.len() > MAX_LINE_CHARS {
            out.push_str(&format!(
                "L{line_no}: {}... [line truncated at {MAX_LINE_CHARS} chars]\n",
                &line[..MAX_LINE_CHARS]
            ));
        } else {
            out.push_str(&format!("L{line_no}: {line}\n"));
        }
    }

    if offset + limit < total {
        out.push_str(&format!(
            "[{total} lines total; use offset/limit to see more]\n"
        ));
    }

    Ok(out)
}

// ── list_directory ───────────────────────────────────────────────────

/// List a directory tree rooted within the workspace, up to a depth limit.
pub struct ListDirectory {
    workdir: String,
}

impl ListDirectory {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for ListDirectory {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_directory".into(),
            description: ToolSpec::builder("list_directory")
                .purpose("List files and subdirectories under a workspace path")
                .when_to_use("When you need to discover what exists under a directory")
                .when_not_to_use("When you already know the exact file path — use read_file")
                .parameters(serde_json::json!({}))
                .example("list_directory(path='src')", "src/\n  lib.rs\n  tools/")
                .output_format("Indented tree; directories end with `/`")
                .build()
                .to_description(),
            parameters: vec![
                ToolParameter {
                    name: "path".into(),
                    param_type: ParamType::String,
                    description: "directory path relative to the workspace root".into(),
                    required: true,
                },
                ToolParameter {
                    name: "depth".into(),
                    param_type: ParamType::Number,
                    description: "recursion depth (default 2)".into(),
                    required: false,
                },
            ],
        }
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
        let workdir = self.workdir.clone();
        Box::pin(async move {
            as_tool_result("list_directory", list_directory_impl(&workdir, params).await)
        })
    }
}

async fn list_directory_impl(
    workdir: &str,
    params: &HashMap<String, Json>,
) -> Result<String, ToolError> {
    let path = required_string(params, "path")?;
    let full_path = resolve_in_workdir(workdir, &path)?;
    let depth = get_u64(params, "depth").unwrap_or(DEFAULT_LIST_DIR_DEPTH as u64) as usize;

    let metadata = fs::metadata(&full_path)
        .await
        .map_err(|e| ToolError::from_io(&e, &format!("listing {path}")))?;
    if !metadata.is_dir() {
        return Err(ToolError::invalid_arguments(format!(
            "`{path}` is not a directory; use read_file instead"
        )));
    }

    let mut entries = Vec::new();
    collect_entries(&full_path, depth, 0, &mut entries).await?;

    let total = entries.len();
    let mut out = format!("{path}/\n");
    for entry in entries.into_iter().take(DEFAULT_LIST_DIR_LIMIT) {
        out.push_str(&entry);
        out.push('\n');
    }
    if total > DEFAULT_LIST_DIR_LIMIT {
        out.push_str(&format!("[{total} entries total, truncated]\n"));
    }
    Ok(out)
}

fn collect_entries<'a>(
    dir: &'a Path,
    max_depth: usize,
    current_depth: usize,
    out: &'a mut Vec<String>,
) -> Pin<Box<dyn Future<Output = Result<(), ToolError>> + Send + 'a>> {
    Box::pin(async move {
        let mut rd = fs::read_dir(dir)
            .await
            .map_err(|e| ToolError::from_io(&e, "reading directory"))?;

        let mut children: Vec<(String, std::fs::FileType)> = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| ToolError::from_io(&e, "reading directory entry"))?
        {
            if let Ok(ft) = entry.file_type().await {
                children.push((entry.file_name().to_string_lossy().to_string(), ft));
            }
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));

        let indent = "  ".repeat(current_depth + 1);
        for (name, ft) in &children {
            let suffix = if ft.is_dir() { "/" } else { "" };
            out.push(format!("{indent}{name}{suffix}"));
            if ft.is_dir() && current_depth < max_depth {
                collect_entries(&dir.join(name), max_depth, current_depth + 1, out).await?;
            }
        }
        Ok(())
    })
}

use std::future::Future;
use std::pin::Pin;

// ── write_file ───────────────────────────────────────────────────────

/// Create a new file or overwrite an existing one, always under a backup
/// made by the mediator before this tool runs — this tool itself does
/// not take its own backup; that's the mediator's job for every mutation.
pub struct WriteFile {
    workdir: String,
}

impl WriteFile {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for WriteFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".into(),
            description: ToolSpec::builder("write_file")
                .purpose("Create a new file or overwrite an existing file's content")
                .when_to_use("When creating a new file or replacing a file wholesale")
                .when_not_to_use(
                    "When making a small, targeted change to an existing file — use apply_diff",
                )
                .parameters(serde_json::json!({}))
                .example(
                    "write_file(path='src/new.rs', content='pub fn x() {}\\n')",
                    "Wrote 1 line to src/new.rs",
                )
                .output_format("Confirmation with line count and path")
                .build()
                .to_description(),
            parameters: vec![
                ToolParameter {
                    name: "path".into(),
                    param_type: ParamType::String,
                    description: "path relative to the workspace root".into(),
                    required: true,
                },
                ToolParameter {
                    name: "content".into(),
                    param_type: ParamType::String,
                    description: "the file's full new content".into(),
                    required: true,
                },
            ],
        }
    }

    fn is_mutation(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
        let workdir = self.workdir.clone();
        Box::pin(async move { as_tool_result("write_file", write_file_impl(&workdir, params).await) })
    }
}

async fn write_file_impl(workdir: &str, params: &HashMap<String, Json>) -> Result<String, ToolError> {
    let path = required_string(params, "path")?;
    let content = required_string(params, "content")?;
    let full_path = resolve_in_workdir(workdir, &path)?;

    if let Some(parent) = full_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::from_io(&e, &format!("creating directories for {path}")))?;
        }
    }

    fs::write(&full_path, &content)
        .await
        .map_err(|e| ToolError::from_io(&e, &format!("writing {path}")))?;

    let line_count = content.lines().count();
    Ok(format!(
        "Wrote {line_count} line{} to {path}",
        if line_count == 1 { "" } else { "s" }
    ))
}

// ── apply_diff ───────────────────────────────────────────────────────

/// Apply a unified diff to a file under the workspace, writing a `.backup`
/// of the pre-image before touching the target and restoring it if the
/// patch doesn't cleanly apply.
///
/// A diff whose old-file side is `/dev/null` creates a new file instead of
/// patching an existing one.
pub struct ApplyDiff {
    workdir: String,
}

impl ApplyDiff {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for ApplyDiff {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "apply_diff".into(),
            description: ToolSpec::builder("apply_diff")
                .purpose("Apply a unified diff hunk to a file in the workspace")
                .when_to_use("When making a targeted change you can express as a unified diff")
                .when_not_to_use("When replacing a whole file — use write_file instead")
                .parameters(serde_json::json!({}))
                .example(
                    "apply_diff(path='src/lib.rs', diff='@@ -1,1 +1,1 @@\\n-old\\n+new\\n')",
                    "Applied diff to src/lib.rs (backup saved to src/lib.rs.backup)",
                )
                .output_format("Confirmation naming the patched file and its backup path")
                .build()
                .to_description(),
            parameters: vec![
                ToolParameter {
                    name: "path".into(),
                    param_type: ParamType::String,
                    description: "path relative to the workspace root".into(),
                    required: true,
                },
                ToolParameter {
                    name: "diff".into(),
                    param_type: ParamType::String,
                    description: "unified diff body (hunks only, or a full `---`/`+++` diff)".into(),
                    required: true,
                },
            ],
        }
    }

    fn is_mutation(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
        let workdir = self.workdir.clone();
        Box::pin(async move { as_tool_result("apply_diff", apply_diff_impl(&workdir, params).await) })
    }
}

async fn apply_diff_impl(workdir: &str, params: &HashMap<String, Json>) -> Result<String, ToolError> {
    let path = required_string(params, "path")?;
    let diff = required_string(params, "diff")?;
    let full_path = resolve_in_workdir(workdir, &path)?;

    let is_new_file = diff.lines().any(|l| l.trim_start().starts_with("--- /dev/null"));

    let original = if is_new_file {
        String::new()
    } else {
        fs::read_to_string(&full_path)
            .await
            .map_err(|e| ToolError::from_io(&e, &format!("reading {path}")))?
    };

    let patched = apply_unified_diff(&original, &diff)
        .map_err(|msg| ToolError::invalid_arguments(format!("diff did not apply cleanly: {msg}")))?;

    let backup_path = format!("{}.backup", full_path.to_string_lossy());
    if !is_new_file {
        fs::write(&backup_path, &original)
            .await
            .map_err(|e| ToolError::from_io(&e, "writing backup"))?;
    }

    if let Some(parent) = full_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::from_io(&e, "creating parent directories"))?;
        }
    }

    if let Err(e) = fs::write(&full_path, &patched).await {
        if !is_new_file {
            let _ = fs::copy(&backup_path, &full_path).await;
        }
        return Err(ToolError::from_io(&e, &format!("writing {path}")));
    }

    if is_new_file {
        Ok(format!("Applied diff to {path} (new file)"))
    } else {
        Ok(format!("Applied diff to {path} (backup saved to {path}.backup)"))
    }
}

/// Apply a unified diff body to `original`, returning the patched text.
///
/// Walks the diff's hunks in order; for each hunk, copies unchanged source
/// lines up to the hunk's start (1-based in the header, 0-based once we're
/// indexing), then replays `-`/`+`/` ` lines against the source cursor.
pub(crate) fn apply_unified_diff(original: &str, diff: &str) -> Result<String, String> {
    let src_lines: Vec<&str> = if original.is_empty() {
        Vec::new()
    } else {
        original.lines().collect()
    };

    let mut out = Vec::new();
    let mut cursor = 0usize; // 0-based index into src_lines
    let mut saw_hunk = false;

    let mut lines = diff.lines().peekable();
    while let Some(line) = lines.next() {
        if let Some(header) = line.strip_prefix("@@ ") {
            saw_hunk = true;
            let old_start = parse_hunk_old_start(header)?;
            // Copy everything between the cursor and the hunk start verbatim.
            if old_start > cursor {
                out.extend_from_slice(&src_lines[cursor..old_start.min(src_lines.len())]);
            }
            cursor = old_start;
            continue;
        }
        if line.starts_with("---") || line.starts_with("+++") {
            continue;
        }
        match line.chars().next() {
            Some('-') => {
                if cursor >= src_lines.len() {
                    return Err("removal past end of file".into());
                }
                cursor += 1;
            }
            Some('+') => {
                out.push(&line[1..]);
            }
            Some(' ') => {
                if cursor >= src_lines.len() {
                    return Err("context line past end of file".into());
                }
                out.push(src_lines[cursor]);
                cursor += 1;
            }
            _ => {} // blank lines inside a hunk body are treated as empty context
        }
    }

    if !saw_hunk {
        return Err("no hunk headers found in diff".into());
    }

    // Trailing unchanged lines after the last hunk.
    if cursor < src_lines.len() {
        out.extend_from_slice(&src_lines[cursor..]);
    }

    let mut result = out.join("\n");
    if original.ends_with('\n') || original.is_empty() {
        result.push('\n');
    }
    Ok(result)
}

/// Parse the old-file start line out of a `@@ -old_start,old_count +new_start,new_count @@` header.
fn parse_hunk_old_start(header: &str) -> Result<usize, String> {
    let old_range = header
        .split_whitespace()
        .next()
        .ok_or("malformed hunk header")?;
    let digits = old_range.trim_start_matches('-');
    let start_str = digits.split(',').next().ok_or("malformed hunk header")?;
    let start: usize = start_str.parse().map_err(|_| "non-numeric hunk start")?;
    Ok(start.saturating_sub(1))
}

// ── run_command ──────────────────────────────────────────────────────

/// Run a shell command in (or under) the workspace root, subject to a
/// first-token/exact-prefix blocklist and a wall-clock timeout.
pub struct RunCommand {
    workdir: String,
    blocked_prefixes: Vec<String>,
}

impl RunCommand {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            blocked_prefixes: DEFAULT_BLOCKED_COMMAND_PREFIXES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    pub fn with_blocked_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.blocked_prefixes = prefixes;
        self
    }
}

impl Tool for RunCommand {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "run_command".into(),
            description: ToolSpec::builder("run_command")
                .purpose("Run a shell command in the workspace and return its output")
                .when_to_use(
                    "When you need an operation not covered by read_file/list_directory/write_file/apply_diff",
                )
                .when_not_to_use("When a dedicated tool already covers the task")
                .parameters(serde_json::json!({}))
                .example("run_command(command='cargo test')", "[exit: 0]\nrunning 4 tests...")
                .output_format("Prefixed with `[exit: N]`; stdout then stderr")
                .build()
                .to_description(),
            parameters: vec![
                ToolParameter {
                    name: "command".into(),
                    param_type: ParamType::String,
                    description: "shell command to run".into(),
                    required: true,
                },
                ToolParameter {
                    name: "timeout".into(),
                    param_type: ParamType::Number,
                    description: "timeout in seconds (default 300, max 600)".into(),
                    required: false,
                },
            ],
        }
    }

    fn is_mutation(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
        let workdir = self.workdir.clone();
        let blocked = self.blocked_prefixes.clone();
        Box::pin(async move {
            as_tool_result("run_command", run_command_impl(&workdir, &blocked, params).await)
        })
    }
}

async fn run_command_impl(
    workdir: &str,
    blocked_prefixes: &[String],
    params: &HashMap<String, Json>,
) -> Result<String, ToolError> {
    let command = required_string(params, "command")?;
    let lower = command.trim().to_lowercase();
    if blocked_prefixes.iter().any(|p| lower.starts_with(p.as_str()) || lower.contains(p.as_str())) {
        return Err(ToolError::blocked(format!(
            "command `{command}` matches a blocked pattern"
        )));
    }

    let timeout_secs = get_u64(params, "timeout")
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS)
        .min(600);
    let timeout = std::time::Duration::from_secs(timeout_secs);

    match tokio::time::timeout(timeout, run_shell(workdir, &command)).await {
        Ok(output) => Ok(output),
        Err(_) => Err(ToolError::timeout(format!(
            "command did not complete within {timeout_secs}s"
        ))),
    }
}

async fn run_shell(workdir: &str, command: &str) -> String {
    match Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .output()
        .await
    {
        Ok(output) => format_output(output),
        Err(e) => format!("Error running command: {e}"),
    }
}

fn format_output(output: std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let code = output.status.code().unwrap_or(-1);
    if output.status.success() {
        if stderr.is_empty() {
            format!("[exit: {code}]\n{stdout}")
        } else {
            format!("[exit: {code}]\n{stdout}\n[stderr]\n{stderr}")
        }
    } else {
        format!("[exit: {code}]\n{stdout}\n{stderr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, Json> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Json::String(v.to_string())))
            .collect()
    }

    #[test]
    fn resolve_rejects_dotdot_variants() {
        assert!(resolve_in_workdir("/work", "../etc/passwd").is_err());
        assert!(resolve_in_workdir("/work", "..\\etc").is_err());
        assert!(resolve_in_workdir("/work", "a/%2e%2e/b").is_err());
    }

    #[test]
    fn resolve_accepts_plain_relative_path() {
        let resolved = resolve_in_workdir("/work", "src/lib.rs").unwrap();
        assert_eq!(resolved, PathBuf::from("/work/src/lib.rs"));
    }

    #[tokio::test]
    async fn read_file_returns_numbered_lines() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").await.unwrap();
        let tool = ReadFile::new(dir.path().to_string_lossy().to_string());
        let out = tool.execute(&params(&[("path", "a.txt")])).await;
        assert!(out.contains("L1: one"));
        assert!(out.contains("L3: three"));
    }

    #[tokio::test]
    async fn read_file_on_directory_gives_actionable_error() {
        let dir = tempdir().unwrap();
        let tool = ReadFile::new(dir.path().to_string_lossy().to_string());
        let out = tool.execute(&params(&[("path", ".")])).await;
        assert!(out.contains("invalid-arguments"));
        assert!(out.contains("list_directory"));
    }

    #[tokio::test]
    async fn read_file_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let tool = ReadFile::new(dir.path().to_string_lossy().to_string());
        let out = tool.execute(&params(&[("path", "../../etc/passwd")])).await;
        assert!(out.starts_with("path-violation"));
    }

    #[tokio::test]
    async fn write_file_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let tool = WriteFile::new(dir.path().to_string_lossy().to_string());
        let out = tool
            .execute(&params(&[("path", "nested/new.txt"), ("content", "hi\n")]))
            .await;
        assert!(out.starts_with("Wrote 1 line"));
        assert!(dir.path().join("nested/new.txt").exists());
    }

    #[tokio::test]
    async fn list_directory_lists_entries() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").await.unwrap();
        fs::create_dir(dir.path().join("sub")).await.unwrap();
        let tool = ListDirectory::new(dir.path().to_string_lossy().to_string());
        let out = tool.execute(&params(&[("path", ".")])).await;
        assert!(out.contains("a.txt"));
        assert!(out.contains("sub/"));
    }

    #[test]
    fn apply_unified_diff_replaces_a_line() {
        let original = "one\ntwo\nthree\n";
        let diff = "@@ -1,3 +1,3 @@\n one\n-two\n+TWO\n three\n";
        let patched = apply_unified_diff(original, diff).unwrap();
        assert_eq!(patched, "one\nTWO\nthree\n");
    }

    #[test]
    fn apply_unified_diff_creates_new_file_from_dev_null() {
        let diff = "--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1,2 @@\n+line one\n+line two\n";
        let patched = apply_unified_diff("", diff).unwrap();
        assert_eq!(patched, "line one\nline two\n");
    }

    #[tokio::test]
    async fn apply_diff_writes_backup_before_mutating() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), "one\ntwo\nthree\n").await.unwrap();
        let tool = ApplyDiff::new(dir.path().to_string_lossy().to_string());
        let diff = "@@ -1,3 +1,3 @@\n one\n-two\n+TWO\n three\n";
        let out = tool.execute(&params(&[("path", "f.txt"), ("diff", diff)])).await;
        assert!(out.contains("backup saved"));
        let backup = fs::read_to_string(dir.path().join("f.txt.backup")).await.unwrap();
        assert_eq!(backup, "one\ntwo\nthree\n");
        let patched = fs::read_to_string(dir.path().join("f.txt")).await.unwrap();
        assert_eq!(patched, "one\nTWO\nthree\n");
    }

    #[tokio::test]
    async fn run_command_blocks_destructive_pattern() {
        let dir = tempdir().unwrap();
        let tool = RunCommand::new(dir.path().to_string_lossy().to_string());
        let out = tool.execute(&params(&[("command", "rm -rf /")])).await;
        assert!(out.starts_with("blocked"));
    }

    #[tokio::test]
    async fn run_command_returns_exit_code_and_stdout() {
        let dir = tempdir().unwrap();
        let tool = RunCommand::new(dir.path().to_string_lossy().to_string());
        let out = tool.execute(&params(&[("command", "echo hi")])).await;
        assert!(out.contains("[exit: 0]"));
        assert!(out.contains("hi"));
    }
}
