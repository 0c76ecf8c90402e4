//! The safety mediator: wraps every tool dispatch with policy, backup,
//! confirmation, and rollback.
//!
//! The orchestrator never calls a [`Tool`](crate::tools::core::Tool) directly;
//! every call goes through [`SafetyMediator::dispatch`], which is the one
//! place that knows about [`SafetyMode`], backups, and the approval prompt.

use crate::error::ToolError;
use crate::tools::common::resolve_in_workdir;
use crate::tools::core::{Tool, ToolCall, ToolRegistry, ToolResult};
use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How aggressively the mediator lets tool calls through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyMode {
    /// Log the intended call and return a simulated success without ever
    /// invoking the handler.
    DryRun,
    /// Safe (non-mutating) tools proceed silently; mutating tools go through
    /// the approval prompt.
    Review,
    /// Every call proceeds immediately.
    AutoApply,
}

/// Per-file history of pre-image snapshots, bounded FIFO at
/// [`BACKUP_HISTORY_LIMIT`] entries per path: older backups are discarded
/// first.
const BACKUP_HISTORY_LIMIT: usize = 5;

#[derive(Debug, Clone)]
struct BackupRecord {
    content: String,
}

/// What the approval prompt handed back for a pending mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Accept,
    Reject,
    ShowDiff,
    Quit,
}

/// A pending mutation, as presented to whatever implements [`ApprovalPrompt`].
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool: String,
    pub path: Option<String>,
    pub diff_preview: String,
}

/// The TTY side of the approval contract. `bailu-cli` implements this
/// against a raw-mode terminal; tests implement it against a fixed queue of
/// decisions. Reading from the controlling TTY must temporarily detach any
/// REPL line-editor listeners and restore them exactly as found on return —
/// that's this trait's caller's job, not the mediator's, since only the REPL
/// knows what it has listening.
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn ask(&self, request: &ApprovalRequest) -> ApprovalDecision;

    /// Offer to restore the most recent backup for `path` after `error`.
    /// Returns `true` if the user accepted the rollback.
    async fn offer_rollback(&self, path: &str, error: &str) -> bool;
}

/// Auto-accepts every prompt and declines every rollback offer. Used when a
/// caller runs in `auto-apply`/`dry-run` mode and never actually needs a TTY,
/// so `SafetyMediator` always has *some* prompt to call.
pub struct NoopPrompt;

#[async_trait]
impl ApprovalPrompt for NoopPrompt {
    async fn ask(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Accept
    }

    async fn offer_rollback(&self, _path: &str, _error: &str) -> bool {
        false
    }
}

/// Wraps a [`ToolRegistry`] with policy, backup-before-mutate, and rollback.
pub struct SafetyMediator {
    registry: ToolRegistry,
    mode: SafetyMode,
    workdir: String,
    continue_on_error: bool,
    backups: Mutex<HashMap<String, VecDeque<BackupRecord>>>,
    approval: Box<dyn ApprovalPrompt>,
}

impl SafetyMediator {
    pub fn new(registry: ToolRegistry, mode: SafetyMode, workdir: impl Into<String>) -> Self {
        Self {
            registry,
            mode,
            workdir: workdir.into(),
            continue_on_error: false,
            backups: Mutex::new(HashMap::new()),
            approval: Box::new(NoopPrompt),
        }
    }

    pub fn with_approval_prompt(mut self, prompt: Box<dyn ApprovalPrompt>) -> Self {
        self.approval = prompt;
        self
    }

    /// Whether a non-final call failing should still let the remaining calls
    /// in the same turn run. Default `false` — a turn's calls are skipped
    /// once one fails.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn mode(&self) -> SafetyMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SafetyMode) {
        self.mode = mode;
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Dispatch every call in a turn, in order. Once one call fails and
    /// `continue_on_error` is `false`, the remaining calls are dropped
    /// entirely — they are not reported to the model.
    pub async fn dispatch_turn(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.dispatch(call).await;
            let failed = result.is_error();
            results.push(result);
            if failed && !self.continue_on_error {
                break;
            }
        }
        results
    }

    /// Run the per-call dispatch algorithm for a single tool call.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&call.tool) else {
            warn!(tool = %call.tool, "mediator: unknown tool");
            return ToolResult::err(
                &call.tool,
                ToolError::invalid_arguments(format!("unknown tool `{}`", call.tool)),
            );
        };

        if self.mode == SafetyMode::DryRun {
            info!(tool = %call.tool, params = ?call.params, "dry-run: simulating call");
            return ToolResult::ok(&call.tool, "simulated");
        }

        if self.mode == SafetyMode::Review && tool.is_mutation() {
            match self.seek_approval(call, tool).await {
                ApprovalOutcome::Proceed => {}
                ApprovalOutcome::Cancelled => {
                    return ToolResult::err(
                        &call.tool,
                        ToolError::user_cancelled("rejected by user"),
                    );
                }
                ApprovalOutcome::Quit => {
                    info!("mediator: user chose to quit from the approval prompt");
                    std::process::exit(0);
                }
            }
        }

        if let Some((rel_path, full_path)) = self.backup_target_path(call, tool) {
            if let Ok(content) = tokio::fs::read_to_string(&full_path).await {
                self.record_backup(&rel_path, content).await;
            }
        }

        let mut result = self.registry.execute(call).await;

        if result.is_error() {
            if let Some(path) = call_path_arg(call) {
                if self.has_backup(&path).await {
                    result = self.handle_mutation_failure(result, &path).await;
                }
            }
        }

        result
    }

    /// Whether `path`'s most recent backup differs from its current on-disk
    /// content (and thus a rollback is still actionable). Mostly useful for
    /// tests and for a future `/rollback` CLI command; the mediator's own
    /// failure path uses [`has_backup`] directly.
    pub async fn backup_count(&self, path: &str) -> usize {
        self.backups.lock().await.get(path).map(VecDeque::len).unwrap_or(0)
    }

    async fn has_backup(&self, path: &str) -> bool {
        self.backups
            .lock()
            .await
            .get(path)
            .is_some_and(|d| !d.is_empty())
    }

    async fn record_backup(&self, path: &str, content: String) {
        let mut backups = self.backups.lock().await;
        let history = backups.entry(path.to_string()).or_default();
        history.push_back(BackupRecord { content });
        while history.len() > BACKUP_HISTORY_LIMIT {
            history.pop_front();
        }
    }

    /// Only `write_file` and `apply_diff` get a pre-invocation backup;
    /// `run_command` is mutating in the sense that it gates on the
    /// approval prompt, but it names no file to snapshot.
    fn backup_target_path(&self, call: &ToolCall, tool: &dyn Tool) -> Option<(String, PathBuf)> {
        if !tool.is_mutation() || !matches!(call.tool.as_str(), "write_file" | "apply_diff") {
            return None;
        }
        let path = call_path_arg(call)?;
        let full = resolve_in_workdir(&self.workdir, &path).ok()?;
        Some((path, full))
    }

    async fn handle_mutation_failure(&self, result: ToolResult, path: &str) -> ToolResult {
        match self.mode {
            SafetyMode::Review => {
                let error = result.error.clone().unwrap_or_default();
                if self.approval.offer_rollback(path, &error).await {
                    self.rollback(path, result).await
                } else {
                    result
                }
            }
            _ => {
                let hint = result
                    .error
                    .map(|e| format!("{e} (a backup is available; rollback was not offered automatically)"));
                ToolResult {
                    error: hint,
                    ..result
                }
            }
        }
    }

    /// Restore `path`'s most recent backup and turn the failed result into a
    /// "rolled back" one.
    async fn rollback(&self, path: &str, result: ToolResult) -> ToolResult {
        let content = {
            let backups = self.backups.lock().await;
            backups.get(path).and_then(|d| d.back()).map(|b| b.content.clone())
        };

        let Some(content) = content else { return result };

        let Ok(full_path) = resolve_in_workdir(&self.workdir, path) else {
            return result;
        };

        match tokio::fs::write(&full_path, &content).await {
            Ok(()) => {
                debug!(path, "mediator: rolled back mutation to last backup");
                let base = result.error.unwrap_or_default();
                ToolResult {
                    error: Some(format!("{base} (rolled back)")),
                    ..result
                }
            }
            Err(e) => {
                warn!(path, error = %e, "mediator: rollback write failed");
                let base = result.error.unwrap_or_default();
                ToolResult {
                    error: Some(format!("{base} (rollback also failed: {e})")),
                    ..result
                }
            }
        }
    }

    async fn seek_approval(&self, call: &ToolCall, tool: &dyn Tool) -> ApprovalOutcome {
        let path = call_path_arg(call);
        let mut summarized = true;
        let mut request = ApprovalRequest {
            tool: call.tool.clone(),
            path: path.clone(),
            diff_preview: self.diff_preview(call, tool, summarized).await,
        };

        loop {
            match self.approval.ask(&request).await {
                ApprovalDecision::Accept => return ApprovalOutcome::Proceed,
                ApprovalDecision::Reject => return ApprovalOutcome::Cancelled,
                ApprovalDecision::Quit => return ApprovalOutcome::Quit,
                ApprovalDecision::ShowDiff => {
                    summarized = false;
                    request.diff_preview = self.diff_preview(call, tool, summarized).await;
                }
            }
        }
    }

    /// Build the diff the approval prompt displays. `write_file` and
    /// `apply_diff` get a real unified diff against the current on-disk
    /// content; anything else (`run_command`) gets a one-line description.
    async fn diff_preview(&self, call: &ToolCall, tool: &dyn Tool, summarized: bool) -> String {
        if !matches!(call.tool.as_str(), "write_file" | "apply_diff") {
            return describe_non_file_call(call);
        }

        let Some(path) = call_path_arg(call) else {
            return describe_non_file_call(call);
        };

        let old = resolve_in_workdir(&self.workdir, &path)
            .ok()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .unwrap_or_default();

        let new = match call.tool.as_str() {
            "write_file" => call
                .params
                .get("content")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string(),
            "apply_diff" => call
                .params
                .get("diff")
                .and_then(Json::as_str)
                .map(|diff| crate::tools::common::apply_unified_diff(&old, diff).unwrap_or_else(|_| old.clone()))
                .unwrap_or_else(|| old.clone()),
            _ => unreachable!(),
        };

        let full = render_unified_diff(&path, &old, &new);
        if summarized {
            truncate_preview(&full, 40)
        } else {
            full
        }
    }
}

enum ApprovalOutcome {
    Proceed,
    Cancelled,
    Quit,
}

fn call_path_arg(call: &ToolCall) -> Option<String> {
    call.params.get("path").and_then(Json::as_str).map(str::to_string)
}

fn describe_non_file_call(call: &ToolCall) -> String {
    let args: Vec<String> = call
        .params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    format!("{}({})", call.tool, args.join(", "))
}

fn truncate_preview(diff: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = diff.lines().collect();
    if lines.len() <= max_lines {
        return diff.to_string();
    }
    let mut out = lines[..max_lines].join("\n");
    out.push_str(&format!("\n… {} more line(s), press `d` to see the full diff", lines.len() - max_lines));
    out
}

/// Line-level unified diff between `old` and `new`, rendered with `-`/`+`/` `
/// prefixes (no hunk headers — this is a human-facing preview, not something
/// [`apply_unified_diff`](crate::tools::common::apply_unified_diff) round-trips).
/// Uses a straightforward O(n·m) LCS since previews are single files, not
/// repository-scale diffs.
fn render_unified_diff(path: &str, old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let n = old_lines.len();
    let m = new_lines.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old_lines[i] == new_lines[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = format!("--- {path}\n+++ {path}\n");
    let (mut i, mut j) = (0, 0);
    let mut added = 0;
    let mut removed = 0;
    while i < n && j < m {
        if old_lines[i] == new_lines[j] {
            out.push_str(&format!(" {}\n", old_lines[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push_str(&format!("-{}\n", old_lines[i]));
            removed += 1;
            i += 1;
        } else {
            out.push_str(&format!("+{}\n", new_lines[j]));
            added += 1;
            j += 1;
        }
    }
    while i < n {
        out.push_str(&format!("-{}\n", old_lines[i]));
        removed += 1;
        i += 1;
    }
    while j < m {
        out.push_str(&format!("+{}\n", new_lines[j]));
        added += 1;
        j += 1;
    }
    out.push_str(&format!("({added} added, {removed} removed)"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::common::{ApplyDiff, ReadFile, WriteFile};
    use std::sync::Mutex as StdMutex;

    struct ScriptedPrompt {
        decisions: StdMutex<VecDeque<ApprovalDecision>>,
        rollback: bool,
    }

    impl ScriptedPrompt {
        fn new(decisions: Vec<ApprovalDecision>) -> Self {
            Self {
                decisions: StdMutex::new(decisions.into()),
                rollback: false,
            }
        }

        fn with_rollback(mut self, accept: bool) -> Self {
            self.rollback = accept;
            self
        }
    }

    #[async_trait]
    impl ApprovalPrompt for ScriptedPrompt {
        async fn ask(&self, _request: &ApprovalRequest) -> ApprovalDecision {
            self.decisions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ApprovalDecision::Reject)
        }

        async fn offer_rollback(&self, _path: &str, _error: &str) -> bool {
            self.rollback
        }
    }

    fn call(tool: &str, params: &[(&str, Json)]) -> ToolCall {
        ToolCall {
            tool: tool.to_string(),
            params: params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    #[tokio::test]
    async fn dry_run_never_invokes_the_handler() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new().with(Box::new(WriteFile::new(dir.path().to_str().unwrap())));
        let mediator = SafetyMediator::new(registry, SafetyMode::DryRun, dir.path().to_str().unwrap());

        let result = mediator
            .dispatch(&call(
                "write_file",
                &[("path", Json::String("x.txt".into())), ("content", Json::String("hi".into()))],
            ))
            .await;

        assert_eq!(result.output, "simulated");
        assert!(!dir.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn auto_apply_proceeds_without_prompting() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new().with(Box::new(WriteFile::new(dir.path().to_str().unwrap())));
        let mediator = SafetyMediator::new(registry, SafetyMode::AutoApply, dir.path().to_str().unwrap());

        let result = mediator
            .dispatch(&call(
                "write_file",
                &[("path", Json::String("x.txt".into())), ("content", Json::String("hi".into()))],
            ))
            .await;

        assert!(!result.is_error());
        assert_eq!(std::fs::read_to_string(dir.path().join("x.txt")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn review_mode_lets_safe_tools_through_silently() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "hi").unwrap();
        let registry = ToolRegistry::new().with(Box::new(ReadFile::new(dir.path().to_str().unwrap())));
        let mediator = SafetyMediator::new(registry, SafetyMode::Review, dir.path().to_str().unwrap())
            .with_approval_prompt(Box::new(ScriptedPrompt::new(vec![])));

        let result = mediator
            .dispatch(&call("read_file", &[("path", Json::String("x.txt".into()))]))
            .await;

        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn review_mode_rejects_on_n() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new().with(Box::new(WriteFile::new(dir.path().to_str().unwrap())));
        let mediator = SafetyMediator::new(registry, SafetyMode::Review, dir.path().to_str().unwrap())
            .with_approval_prompt(Box::new(ScriptedPrompt::new(vec![ApprovalDecision::Reject])));

        let result = mediator
            .dispatch(&call(
                "write_file",
                &[("path", Json::String("x.txt".into())), ("content", Json::String("hi".into()))],
            ))
            .await;

        assert!(result.is_error());
        assert!(result.error.unwrap().starts_with("user-cancelled"));
        assert!(!dir.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn review_mode_show_diff_then_accept() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new().with(Box::new(WriteFile::new(dir.path().to_str().unwrap())));
        let mediator = SafetyMediator::new(registry, SafetyMode::Review, dir.path().to_str().unwrap())
            .with_approval_prompt(Box::new(ScriptedPrompt::new(vec![
                ApprovalDecision::ShowDiff,
                ApprovalDecision::Accept,
            ])));

        let result = mediator
            .dispatch(&call(
                "write_file",
                &[("path", Json::String("x.txt".into())), ("content", Json::String("hi".into()))],
            ))
            .await;

        assert!(!result.is_error());
        assert_eq!(std::fs::read_to_string(dir.path().join("x.txt")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn backup_is_taken_before_overwrite_and_survives_in_history() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "original").unwrap();
        let registry = ToolRegistry::new().with(Box::new(WriteFile::new(dir.path().to_str().unwrap())));
        let mediator = SafetyMediator::new(registry, SafetyMode::AutoApply, dir.path().to_str().unwrap());

        mediator
            .dispatch(&call(
                "write_file",
                &[("path", Json::String("x.txt".into())), ("content", Json::String("new".into()))],
            ))
            .await;

        assert_eq!(mediator.backup_count("x.txt").await, 1);
    }

    #[tokio::test]
    async fn backup_history_is_capped_fifo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "v0").unwrap();
        let registry = ToolRegistry::new().with(Box::new(WriteFile::new(dir.path().to_str().unwrap())));
        let mediator = SafetyMediator::new(registry, SafetyMode::AutoApply, dir.path().to_str().unwrap());

        for n in 1..=8 {
            mediator
                .dispatch(&call(
                    "write_file",
                    &[("path", Json::String("x.txt".into())), ("content", Json::String(format!("v{n}")))],
                ))
                .await;
        }

        assert_eq!(mediator.backup_count("x.txt").await, BACKUP_HISTORY_LIMIT);
    }

    #[tokio::test]
    async fn failed_mutation_offers_rollback_in_review_mode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "original").unwrap();
        let registry = ToolRegistry::new().with(Box::new(ApplyDiff::new(dir.path().to_str().unwrap())));
        let mediator = SafetyMediator::new(registry, SafetyMode::Review, dir.path().to_str().unwrap())
            .with_approval_prompt(Box::new(ScriptedPrompt::new(vec![ApprovalDecision::Accept]).with_rollback(true)));

        let result = mediator
            .dispatch(&call(
                "apply_diff",
                &[
                    ("path", Json::String("x.txt".into())),
                    ("diff", Json::String("@@ -1,1 +1,1 @@\n-does not match\n+new\n".into())),
                ],
            ))
            .await;

        assert!(result.is_error());
        assert!(result.error.unwrap().contains("rolled back"));
    }
}
