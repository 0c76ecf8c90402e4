//! Per-session directories with manifests.
//!
//! Each session gets its own directory under a sessions root, containing a
//! `manifest.json` and a sibling `messages.json` written together by one
//! [`SessionManager::save`] call, so the two never diverge.

use crate::Message;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Lightweight metadata for a session, stored as `manifest.json`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionManifest {
    pub id: String,
    pub name: Option<String>,
    pub model: String,
    pub status: SessionStatus,
    pub created_at: u64,
    pub updated_at: u64,
    pub iterations: u32,
    pub tool_calls_executed: u32,
    pub active_files: Vec<String>,
}

/// Status of a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Interrupted,
}

/// Manager for per-session directories and their manifest/messages pair.
///
/// Directory layout:
/// ```text
/// sessions_dir/
///   <id>/
///     manifest.json
///     messages.json
/// ```
pub struct SessionManager {
    sessions_dir: PathBuf,
}

impl SessionManager {
    /// Create a new manager, ensuring the root sessions directory exists.
    pub fn new(sessions_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let sessions_dir = sessions_dir.into();
        std::fs::create_dir_all(&sessions_dir)?;
        Ok(Self { sessions_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.sessions_dir.join(id)
    }

    fn manifest_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("manifest.json")
    }

    fn messages_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join("messages.json")
    }

    /// Persist a session's manifest and full message history together.
    /// Each file is written atomically (temp file, then rename).
    pub fn save(&self, manifest: &SessionManifest, messages: &[Message]) -> Result<(), String> {
        let dir = self.session_dir(&manifest.id);
        std::fs::create_dir_all(&dir).map_err(|e| format!("failed to create session dir: {e}"))?;

        atomic_write_json(&dir.join(".manifest.json.tmp"), &dir.join("manifest.json"), manifest)?;
        atomic_write_json(&dir.join(".messages.json.tmp"), &dir.join("messages.json"), &messages)?;
        Ok(())
    }

    /// Load a session's manifest and messages. Returns `None` if the session
    /// doesn't exist.
    pub fn load(&self, id: &str) -> Result<Option<(SessionManifest, Vec<Message>)>, String> {
        let manifest_path = self.manifest_path(id);
        if !manifest_path.exists() {
            return Ok(None);
        }
        let manifest_json = std::fs::read_to_string(&manifest_path)
            .map_err(|e| format!("failed to read manifest: {e}"))?;
        let manifest: SessionManifest =
            serde_json::from_str(&manifest_json).map_err(|e| format!("failed to parse manifest: {e}"))?;

        let messages_path = self.messages_path(id);
        let messages = if messages_path.exists() {
            let json = std::fs::read_to_string(&messages_path)
                .map_err(|e| format!("failed to read messages: {e}"))?;
            serde_json::from_str(&json).map_err(|e| format!("failed to parse messages: {e}"))?
        } else {
            Vec::new()
        };

        Ok(Some((manifest, messages)))
    }

    /// List every session's manifest, skipping (and logging) directories
    /// whose manifest is missing or malformed rather than failing the whole
    /// listing.
    pub fn list_sessions(&self) -> Result<Vec<SessionManifest>, String> {
        let entries =
            std::fs::read_dir(&self.sessions_dir).map_err(|e| format!("failed to read sessions dir: {e}"))?;

        let mut manifests = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("failed to read entry: {e}"))?;
            if !entry.file_type().is_ok_and(|ft| ft.is_dir()) {
                continue;
            }
            let manifest_path = entry.path().join("manifest.json");
            if !manifest_path.exists() {
                continue;
            }
            match std::fs::read_to_string(&manifest_path) {
                Ok(json) => match serde_json::from_str::<SessionManifest>(&json) {
                    Ok(m) => manifests.push(m),
                    Err(e) => warn!("skipping malformed manifest at {}: {e}", manifest_path.display()),
                },
                Err(e) => warn!("skipping unreadable manifest at {}: {e}", manifest_path.display()),
            }
        }
        Ok(manifests)
    }

    /// Delete the entire session directory (manifest + messages).
    pub fn delete_session(&self, id: &str) -> Result<(), String> {
        let dir = self.session_dir(id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| format!("failed to delete session dir: {e}"))?;
        }
        Ok(())
    }
}

fn atomic_write_json<T: Serialize>(tmp_path: &Path, final_path: &Path, value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize: {e}"))?;
    std::fs::write(tmp_path, json).map_err(|e| format!("failed to write temp file: {e}"))?;
    std::fs::rename(tmp_path, final_path).map_err(|e| format!("failed to rename into place: {e}"))?;
    Ok(())
}

/// Current unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_manifest(id: &str) -> SessionManifest {
        SessionManifest {
            id: id.into(),
            name: None,
            model: "test-model".into(),
            status: SessionStatus::Running,
            created_at: 1000,
            updated_at: 1000,
            iterations: 0,
            tool_calls_executed: 0,
            active_files: Vec::new(),
        }
    }

    #[test]
    fn save_load_roundtrip_keeps_manifest_and_messages_together() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path()).unwrap();

        let manifest = make_manifest("sess-abc");
        let messages = vec![Message::system("sys"), Message::user("hi")];
        mgr.save(&manifest, &messages).unwrap();

        let (loaded_manifest, loaded_messages) = mgr.load("sess-abc").unwrap().unwrap();
        assert_eq!(loaded_manifest.id, "sess-abc");
        assert_eq!(loaded_manifest.model, "test-model");
        assert_eq!(loaded_messages.len(), 2);
        assert_eq!(loaded_messages[1].content.as_deref(), Some("hi"));
    }

    #[test]
    fn list_sessions_returns_all_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path()).unwrap();

        mgr.save(&make_manifest("sess-aaa"), &[]).unwrap();
        mgr.save(&make_manifest("sess-bbb"), &[]).unwrap();

        let sessions = mgr.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert!(ids.contains(&"sess-aaa"));
        assert!(ids.contains(&"sess-bbb"));
    }

    #[test]
    fn list_sessions_skips_malformed_manifest_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path()).unwrap();

        mgr.save(&make_manifest("sess-good"), &[]).unwrap();
        let bad_dir = dir.path().join("sess-bad");
        std::fs::create_dir_all(&bad_dir).unwrap();
        std::fs::write(bad_dir.join("manifest.json"), "{ not json").unwrap();

        let sessions = mgr.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "sess-good");
    }

    #[test]
    fn delete_session_removes_entire_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path()).unwrap();

        mgr.save(&make_manifest("sess-del"), &[]).unwrap();
        mgr.delete_session("sess-del").unwrap();

        assert!(mgr.load("sess-del").unwrap().is_none());
        assert!(!mgr.session_dir("sess-del").exists());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path()).unwrap();

        mgr.save(&make_manifest("sess-atomic"), &[]).unwrap();

        let tmp = mgr.session_dir("sess-atomic").join(".manifest.json.tmp");
        assert!(!tmp.exists());
    }

    #[test]
    fn missing_session_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path()).unwrap();
        assert!(mgr.load("nonexistent").unwrap().is_none());
    }

    #[test]
    fn session_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Interrupted).unwrap();
        assert_eq!(json, "\"interrupted\"");
        let parsed: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, SessionStatus::Interrupted);
    }

    #[test]
    fn delete_nonexistent_session_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path()).unwrap();
        mgr.delete_session("nope").unwrap();
    }
}
