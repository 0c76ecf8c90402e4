//! Git-aware tools layered on top of the core's five built-ins.
//!
//! Provides [`GitToolsExt`] for registering them onto a
//! [`ToolRegistry`](bailu_core::tools::core::ToolRegistry) alongside whatever
//! built-ins the caller has already added.

pub mod git;

pub use git::{GitBranch, GitCheckout, GitCommit, GitDiff, GitLog, GitStatus};

// ── Tool name constants ─────────────────────────────────────────────

pub const GIT_STATUS: &str = "git_status";
pub const GIT_DIFF: &str = "git_diff";
pub const GIT_LOG: &str = "git_log";
pub const GIT_COMMIT: &str = "git_commit";
pub const GIT_BRANCH: &str = "git_branch";
pub const GIT_CHECKOUT: &str = "git_checkout";

// ── Extension trait ─────────────────────────────────────────────────

/// Extension trait for registering git tools on a
/// [`ToolRegistry`](bailu_core::tools::core::ToolRegistry).
///
/// # Example
///
/// ```ignore
/// use bailu_core::tools::core::ToolRegistry;
/// use bailu_core::tools::common::{ReadFile, WriteFile, ListDirectory, ApplyDiff, RunCommand};
/// use bailu_cli::tools::GitToolsExt;
///
/// let registry = ToolRegistry::new()
///     .with(Box::new(ReadFile::new(".")))
///     .with(Box::new(WriteFile::new(".")))
///     .with_git_tools(".");
/// ```
pub trait GitToolsExt {
    fn with_git_tools(self, workdir: impl Into<String>) -> Self;
}

impl GitToolsExt for bailu_core::tools::core::ToolRegistry {
    fn with_git_tools(self, workdir: impl Into<String>) -> Self {
        let wd = workdir.into();
        self.with(Box::new(GitStatus::new(wd.clone())))
            .with(Box::new(GitDiff::new(wd.clone())))
            .with(Box::new(GitLog::new(wd.clone())))
            .with(Box::new(GitCommit::new(wd.clone())))
            .with(Box::new(GitBranch::new(wd.clone())))
            .with(Box::new(GitCheckout::new(wd)))
    }
}
