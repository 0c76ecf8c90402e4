//! Git-aware ancillary tools, registered alongside the core's five
//! built-ins when the workspace root is a git checkout.
//!
//! | Tool | Name | Purpose |
//! |------|------|---------|
//! | [`GitStatus`] | `git_status` | Show working tree status |
//! | [`GitDiff`] | `git_diff` | Show changes between commits, index, and working tree |
//! | [`GitLog`] | `git_log` | Show commit history |
//! | [`GitCommit`] | `git_commit` | Stage files and create a commit |
//! | [`GitBranch`] | `git_branch` | List or create branches |
//! | [`GitCheckout`] | `git_checkout` | Switch branches or restore files |

use bailu_core::error::ToolError;
use bailu_core::tools::common::resolve_in_workdir;
use bailu_core::tools::core::{
    truncate_result, ParamType, Tool, ToolDefinition, ToolFuture, ToolParameter,
    DEFAULT_MAX_RESULT_BYTES,
};
use bailu_core::tools::spec::ToolSpec;
use serde_json::Value as Json;
use std::collections::HashMap;
use tokio::process::Command;

fn get_str<'a>(params: &'a HashMap<String, Json>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Json::as_str)
}

fn get_bool(params: &HashMap<String, Json>, key: &str) -> Option<bool> {
    params.get(key).and_then(Json::as_bool)
}

fn get_u64(params: &HashMap<String, Json>, key: &str) -> Option<u64> {
    params.get(key).and_then(Json::as_u64)
}

fn required_string(params: &HashMap<String, Json>, key: &str) -> Result<String, ToolError> {
    get_str(params, key)
        .map(str::to_string)
        .ok_or_else(|| ToolError::invalid_arguments(format!("missing required parameter `{key}`")))
}

/// Validate that `path`, relative to `workdir`, doesn't escape it. Git tools
/// only ever pass paths to `git` itself, not to the filesystem directly, but
/// the same traversal check applies — a path argument is a path argument.
fn checked_relative_path(workdir: &str, path: &str) -> Result<String, ToolError> {
    resolve_in_workdir(workdir, path)?;
    Ok(path.to_string())
}

async fn run_git(workdir: &str, args: &[&str]) -> String {
    let result = Command::new("git").args(args).current_dir(workdir).output().await;

    match result {
        Ok(output) => {
            let code = output.status.code().unwrap_or(-1);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);

            if stderr.is_empty() || output.status.success() {
                format!("[exit: {code}]\n{stdout}")
            } else {
                format!("[exit: {code}]\n{stdout}\n[stderr]\n{stderr}")
            }
        }
        Err(e) => format!("Error: failed to run git: {e}"),
    }
}

fn as_tool_result(result: Result<String, ToolError>) -> String {
    match result {
        Ok(s) => truncate_result(s, DEFAULT_MAX_RESULT_BYTES),
        Err(e) => e.to_string(),
    }
}

// ── git_status ───────────────────────────────────────────────────────

/// Show the working tree status (`git status`).
pub struct GitStatus {
    workdir: String,
}

impl GitStatus {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self { workdir: workdir.into() }
    }
}

impl Tool for GitStatus {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: super::GIT_STATUS.into(),
            description: ToolSpec::builder(super::GIT_STATUS)
                .purpose("Show the working tree status")
                .when_to_use(
                    "When you need to see which files are modified, staged, or untracked",
                )
                .when_not_to_use("When you need to see the actual content of changes — use git_diff")
                .parameters(serde_json::json!({}))
                .example("git_status(short=true)", "[exit: 0]\n M src/main.rs\n?? new_file.txt")
                .output_format("Raw `git status` output, prefixed with `[exit: N]`")
                .build()
                .to_description(),
            parameters: vec![ToolParameter {
                name: "short".into(),
                param_type: ParamType::Boolean,
                description: "use `--short` format".into(),
                required: false,
            }],
        }
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
        let workdir = self.workdir.clone();
        Box::pin(async move {
            let mut args = vec!["status"];
            if get_bool(params, "short").unwrap_or(false) {
                args.push("--short");
            }
            truncate_result(run_git(&workdir, &args).await, DEFAULT_MAX_RESULT_BYTES)
        })
    }
}

// ── git_diff ─────────────────────────────────────────────────────────

/// Show changes between commits, index, and working tree (`git diff`).
pub struct GitDiff {
    workdir: String,
}

impl GitDiff {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self { workdir: workdir.into() }
    }
}

impl Tool for GitDiff {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: super::GIT_DIFF.into(),
            description: ToolSpec::builder(super::GIT_DIFF)
                .purpose("Show file changes (unstaged by default, or staged with staged=true)")
                .when_to_use("When you need to see what has changed, not just which files")
                .when_not_to_use("When you only need a file list — use git_status")
                .parameters(serde_json::json!({}))
                .example("git_diff(staged=true)", "[exit: 0]\ndiff --git a/file.rs ...")
                .output_format("Raw `git diff` output, prefixed with `[exit: N]`")
                .build()
                .to_description(),
            parameters: vec![
                ToolParameter {
                    name: "staged".into(),
                    param_type: ParamType::Boolean,
                    description: "show staged changes instead of unstaged".into(),
                    required: false,
                },
                ToolParameter {
                    name: "path".into(),
                    param_type: ParamType::String,
                    description: "limit the diff to this file or directory".into(),
                    required: false,
                },
            ],
        }
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
        let workdir = self.workdir.clone();
        Box::pin(async move { as_tool_result(git_diff_impl(&workdir, params).await) })
    }
}

async fn git_diff_impl(workdir: &str, params: &HashMap<String, Json>) -> Result<String, ToolError> {
    let mut args = vec!["diff"];
    if get_bool(params, "staged").unwrap_or(false) {
        args.push("--staged");
    }

    let path = match get_str(params, "path") {
        Some(p) => Some(checked_relative_path(workdir, p)?),
        None => None,
    };
    if let Some(p) = &path {
        args.push("--");
        args.push(p);
    }

    Ok(run_git(workdir, &args).await)
}

// ── git_log ──────────────────────────────────────────────────────────

/// Show commit history (`git log`).
pub struct GitLog {
    workdir: String,
}

impl GitLog {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self { workdir: workdir.into() }
    }
}

impl Tool for GitLog {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: super::GIT_LOG.into(),
            description: ToolSpec::builder(super::GIT_LOG)
                .purpose("Show recent commit history")
                .when_to_use("When you need to see recent commits or find a specific one")
                .when_not_to_use("When you need the content of a change — use git_diff")
                .parameters(serde_json::json!({}))
                .example(
                    "git_log(count=5, oneline=true)",
                    "[exit: 0]\nabc1234 Fix bug in parser\ndef5678 Add new feature",
                )
                .output_format("Raw `git log` output, prefixed with `[exit: N]`")
                .build()
                .to_description(),
            parameters: vec![
                ToolParameter {
                    name: "count".into(),
                    param_type: ParamType::Number,
                    description: "number of commits to show (default 10, max 100)".into(),
                    required: false,
                },
                ToolParameter {
                    name: "oneline".into(),
                    param_type: ParamType::Boolean,
                    description: "use one-line format".into(),
                    required: false,
                },
            ],
        }
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
        let workdir = self.workdir.clone();
        Box::pin(async move {
            let count = get_u64(params, "count").unwrap_or(10).min(100);
            let count_arg = format!("-{count}");
            let mut args = vec!["log", &count_arg];
            if get_bool(params, "oneline").unwrap_or(false) {
                args.push("--oneline");
            }
            truncate_result(run_git(&workdir, &args).await, DEFAULT_MAX_RESULT_BYTES)
        })
    }
}

// ── git_commit ───────────────────────────────────────────────────────

/// Stage files and create a commit (`git add` + `git commit`).
pub struct GitCommit {
    workdir: String,
}

impl GitCommit {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self { workdir: workdir.into() }
    }
}

impl Tool for GitCommit {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: super::GIT_COMMIT.into(),
            description: ToolSpec::builder(super::GIT_COMMIT)
                .purpose("Stage files and create a git commit")
                .when_to_use(
                    "When asked to commit changes. Provide `paths` to stage specific files, \
                     or omit it to commit whatever is already staged",
                )
                .when_not_to_use("Do not commit unless explicitly asked")
                .parameters(serde_json::json!({}))
                .example(
                    "git_commit(message='Fix typo in README', paths='README.md')",
                    "[exit: 0]\n[main abc1234] Fix typo in README\n 1 file changed",
                )
                .output_format("Raw `git commit` output, prefixed with `[exit: N]`")
                .build()
                .to_description(),
            parameters: vec![
                ToolParameter {
                    name: "message".into(),
                    param_type: ParamType::String,
                    description: "commit message".into(),
                    required: true,
                },
                ToolParameter {
                    name: "paths".into(),
                    param_type: ParamType::String,
                    description: "comma-separated paths to stage before committing".into(),
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
        Box::pin(async move { as_tool_result(git_commit_impl(&workdir, params).await) })
    }
}

async fn git_commit_impl(workdir: &str, params: &HashMap<String, Json>) -> Result<String, ToolError> {
    let message = required_string(params, "message")?;
    if message.trim().is_empty() {
        return Err(ToolError::invalid_arguments("commit message must not be empty"));
    }

    if let Some(raw_paths) = get_str(params, "paths") {
        let paths: Vec<&str> = raw_paths.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        if !paths.is_empty() {
            for p in &paths {
                checked_relative_path(workdir, p)?;
            }
            let mut add_args = vec!["add"];
            add_args.extend(paths);
            let add_result = run_git(workdir, &add_args).await;
            if add_result.starts_with("Error:") || !add_result.starts_with("[exit: 0]") {
                return Err(ToolError::fs_fault(format!("staging files failed: {add_result}")));
            }
        }
    }

    Ok(run_git(workdir, &["commit", "-m", &message]).await)
}

// ── git_branch ───────────────────────────────────────────────────────

/// List local branches, or create a new one (`git branch [name]`).
pub struct GitBranch {
    workdir: String,
}

impl GitBranch {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self { workdir: workdir.into() }
    }
}

impl Tool for GitBranch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: super::GIT_BRANCH.into(),
            description: ToolSpec::builder(super::GIT_BRANCH)
                .purpose("List local branches, or create a new one")
                .when_to_use("When you need to see available branches or create one off HEAD")
                .when_not_to_use("When you need to switch branches — use git_checkout")
                .parameters(serde_json::json!({}))
                .example("git_branch()", "[exit: 0]\n* main\n  feature/x")
                .output_format("Raw `git branch` output, prefixed with `[exit: N]`")
                .build()
                .to_description(),
            parameters: vec![ToolParameter {
                name: "name".into(),
                param_type: ParamType::String,
                description: "if given, create a branch with this name instead of listing".into(),
                required: false,
            }],
        }
    }

    fn is_mutation(&self) -> bool {
        true
    }

    fn execute<'a>(&'a self, params: &'a HashMap<String, Json>) -> ToolFuture<'a> {
        let workdir = self.workdir.clone();
        Box::pin(async move {
            match get_str(params, "name") {
                Some(name) => truncate_result(run_git(&workdir, &["branch", name]).await, DEFAULT_MAX_RESULT_BYTES),
                None => truncate_result(run_git(&workdir, &["branch"]).await, DEFAULT_MAX_RESULT_BYTES),
            }
        })
    }
}

// ── git_checkout ─────────────────────────────────────────────────────

/// Switch branches, or restore specific paths (`git checkout`).
pub struct GitCheckout {
    workdir: String,
}

impl GitCheckout {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self { workdir: workdir.into() }
    }
}

impl Tool for GitCheckout {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: super::GIT_CHECKOUT.into(),
            description: ToolSpec::builder(super::GIT_CHECKOUT)
                .purpose("Switch to a branch, or restore specific paths from a ref")
                .when_to_use(
                    "When asked to switch branches, or to discard working-tree changes to \
                     specific files by restoring them from a ref",
                )
                .when_not_to_use("When creating a new branch without switching — use git_branch")
                .parameters(serde_json::json!({}))
                .example("git_checkout(reference='main')", "[exit: 0]\nSwitched to branch 'main'")
                .output_format("Raw `git checkout` output, prefixed with `[exit: N]`")
                .build()
                .to_description(),
            parameters: vec![
                ToolParameter {
                    name: "reference".into(),
                    param_type: ParamType::String,
                    description: "branch or commit to check out".into(),
                    required: true,
                },
                ToolParameter {
                    name: "path".into(),
                    param_type: ParamType::String,
                    description: "restrict the checkout to this file (`git checkout <ref> -- <path>`)".into(),
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
        Box::pin(async move { as_tool_result(git_checkout_impl(&workdir, params).await) })
    }
}

async fn git_checkout_impl(workdir: &str, params: &HashMap<String, Json>) -> Result<String, ToolError> {
    let reference = required_string(params, "reference")?;
    let path = match get_str(params, "path") {
        Some(p) => Some(checked_relative_path(workdir, p)?),
        None => None,
    };

    let output = match &path {
        Some(p) => run_git(workdir, &["checkout", &reference, "--", p]).await,
        None => run_git(workdir, &["checkout", &reference]).await,
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, Json> {
        pairs.iter().map(|(k, v)| (k.to_string(), Json::String(v.to_string()))).collect()
    }

    #[test]
    fn git_status_definition_is_not_a_mutation() {
        let tool = GitStatus::new("/tmp");
        let def = tool.definition();
        assert_eq!(def.name, "git_status");
        assert!(!tool.is_mutation());
    }

    #[test]
    fn git_diff_definition_is_not_a_mutation() {
        let tool = GitDiff::new("/tmp");
        assert_eq!(tool.definition().name, "git_diff");
        assert!(!tool.is_mutation());
    }

    #[test]
    fn git_log_definition_is_not_a_mutation() {
        let tool = GitLog::new("/tmp");
        assert_eq!(tool.definition().name, "git_log");
        assert!(!tool.is_mutation());
    }

    #[test]
    fn git_commit_definition_is_a_mutation() {
        let tool = GitCommit::new("/tmp");
        assert_eq!(tool.definition().name, "git_commit");
        assert!(tool.is_mutation());
    }

    #[test]
    fn git_branch_and_checkout_are_mutations() {
        assert!(GitBranch::new("/tmp").is_mutation());
        assert!(GitCheckout::new("/tmp").is_mutation());
    }

    #[tokio::test]
    async fn git_commit_rejects_empty_message() {
        let tool = GitCommit::new("/tmp");
        let result = tool.execute(&params(&[("message", "")])).await;
        assert!(result.starts_with("invalid-arguments"));
    }

    #[tokio::test]
    async fn git_commit_requires_message() {
        let tool = GitCommit::new("/tmp");
        let result = tool.execute(&HashMap::new()).await;
        assert!(result.starts_with("invalid-arguments"));
    }

    #[tokio::test]
    async fn git_diff_rejects_path_traversal() {
        let tool = GitDiff::new("/tmp");
        let result = tool.execute(&params(&[("path", "../../etc/passwd")])).await;
        assert!(result.starts_with("path-violation"));
    }

    #[tokio::test]
    async fn git_commit_rejects_path_traversal() {
        let tool = GitCommit::new("/tmp");
        let result = tool
            .execute(&params(&[("message", "test"), ("paths", "../../etc/passwd")]))
            .await;
        assert!(result.starts_with("path-violation"));
    }

    #[tokio::test]
    async fn git_checkout_rejects_path_traversal() {
        let tool = GitCheckout::new("/tmp");
        let result = tool
            .execute(&params(&[("reference", "main"), ("path", "../outside")]))
            .await;
        assert!(result.starts_with("path-violation"));
    }

    #[tokio::test]
    async fn git_status_runs_against_a_real_repo() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().to_str().unwrap();
        run_git(workdir, &["init"]).await;
        let tool = GitStatus::new(workdir);
        let out = tool.execute(&HashMap::new()).await;
        assert!(out.contains("[exit: 0]"));
    }
}
