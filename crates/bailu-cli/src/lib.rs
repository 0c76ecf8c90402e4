//! Terminal coding agent built on `bailu-core`.
//!
//! `bailu-cli` is the REPL and ancillary-tool layer around the core control
//! loop: a `crossterm` raw-mode line editor, a crash-safe session store, git
//! awareness on top of the core's five built-in tools, and the configuration
//! layering described by the core's external-interface contract.
//!
//! # Library usage
//!
//! ```ignore
//! use bailu_cli::config::{resolve_config_dir, UserConfig, WorkspaceConfig};
//! use bailu_cli::tools::GitToolsExt;
//! use bailu_core::tools::core::ToolRegistry;
//!
//! let registry = ToolRegistry::new().with_git_tools(".");
//! ```
//!
//! # Binary
//!
//! ```sh
//! bailu --workdir /path/to/project
//! bailu --prompt "Add error handling to src/main.rs"
//! ```

pub mod config;
pub mod prompt;
pub mod repl;
pub mod tools;

pub use config::{UserConfig, WorkspaceConfig};
pub use prompt::coding_system_prompt;
pub use tools::GitToolsExt;
