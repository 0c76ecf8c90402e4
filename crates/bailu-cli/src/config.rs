//! Configuration layering for the terminal binary.
//!
//! Precedence, highest first: command-line flags → environment variables →
//! `<config-dir>/config.json` → built-in defaults. `CONFIG_DIR` itself is
//! resolved before any file is read. A missing or malformed config file
//! degrades to defaults with a single `warn!`, never aborting — the same
//! posture [`WorkspaceConfig::load`] takes for the workspace-root file.

use std::path::{Path, PathBuf};

use bailu_core::mediator::SafetyMode;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-user settings persisted at `<config-dir>/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub safety_mode: String,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            safety_mode: "review".to_string(),
            model: bailu_core::DEFAULT_MODEL.to_string(),
            base_url: None,
        }
    }
}

impl UserConfig {
    /// Load `<config_dir>/config.json`. Any failure — missing file,
    /// unreadable file, malformed JSON — degrades silently to
    /// [`UserConfig::default`] with a single `warn!`.
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join("config.json");
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("malformed config at {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, config_dir: &Path) -> Result<(), String> {
        std::fs::create_dir_all(config_dir).map_err(|e| format!("failed to create config dir: {e}"))?;
        let json = serde_json::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {e}"))?;
        std::fs::write(config_dir.join("config.json"), json).map_err(|e| format!("failed to write config: {e}"))
    }

    pub fn safety_mode(&self) -> SafetyMode {
        parse_safety_mode(&self.safety_mode).unwrap_or(SafetyMode::Review)
    }
}

pub fn parse_safety_mode(s: &str) -> Option<SafetyMode> {
    match s {
        "dry-run" => Some(SafetyMode::DryRun),
        "review" => Some(SafetyMode::Review),
        "auto-apply" => Some(SafetyMode::AutoApply),
        _ => None,
    }
}

/// Advisory, read-only hints at the workspace root. `.bailu.json`
/// missing, unreadable, or malformed all degrade to `WorkspaceConfig::default()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub test_command: Option<String>,
    pub important_paths: Option<Vec<String>>,
}

impl WorkspaceConfig {
    pub fn load(workspace_root: &Path) -> Self {
        let path = workspace_root.join(".bailu.json");
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("malformed workspace config at {}: {e}, ignoring", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// Resolve `CONFIG_DIR`: the environment variable if set, else
/// `$HOME/.config/bailu`, else `./.bailu` as a last resort when `HOME`
/// isn't set at all.
pub fn resolve_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".config").join("bailu"),
        None => PathBuf::from(".bailu"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_user_config_is_review_mode() {
        let config = UserConfig::default();
        assert_eq!(config.safety_mode, "review");
        assert_eq!(config.safety_mode(), SafetyMode::Review);
    }

    #[test]
    fn load_missing_config_file_degrades_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = UserConfig::load(dir.path());
        assert_eq!(config.model, bailu_core::DEFAULT_MODEL);
    }

    #[test]
    fn load_malformed_config_file_degrades_to_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let config = UserConfig::load(dir.path());
        assert_eq!(config.safety_mode, "review");
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UserConfig::default();
        config.model = "a/b".to_string();
        config.save(dir.path()).unwrap();

        let loaded = UserConfig::load(dir.path());
        assert_eq!(loaded.model, "a/b");
    }

    #[test]
    fn workspace_config_missing_file_degrades_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig::load(dir.path());
        assert!(config.test_command.is_none());
    }

    #[test]
    fn workspace_config_malformed_file_degrades_to_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".bailu.json"), "not json at all").unwrap();
        let config = WorkspaceConfig::load(dir.path());
        assert!(config.important_paths.is_none());
    }

    #[test]
    fn workspace_config_loads_present_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".bailu.json"),
            r#"{"test_command": "cargo test", "important_paths": ["src/lib.rs"]}"#,
        )
        .unwrap();
        let config = WorkspaceConfig::load(dir.path());
        assert_eq!(config.test_command.as_deref(), Some("cargo test"));
        assert_eq!(config.important_paths.unwrap(), vec!["src/lib.rs".to_string()]);
    }

    #[test]
    fn parse_safety_mode_rejects_unknown_strings() {
        assert_eq!(parse_safety_mode("nonsense"), None);
        assert_eq!(parse_safety_mode("dry-run"), Some(SafetyMode::DryRun));
    }
}
