//! Configuration for an [`Orchestrator`](crate::orchestrator::Orchestrator) run.
//!
//! # Examples
//!
//! ```ignore
//! let settings = OrchestratorSettings::new("anthropic/claude-sonnet-4")
//!     .with_max_tokens(4096)
//!     .with_temperature(0.3);
//! ```

use std::path::PathBuf;

/// Model, token, and session-persistence settings a caller builds once (e.g.
/// from CLI flags and workspace config) and turns into an
/// [`OrchestratorConfig`](crate::orchestrator::OrchestratorConfig) plus a
/// [`SessionManager`](super::session::SessionManager) per run.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Model identifier (e.g. `"anthropic/claude-sonnet-4"`).
    pub model: String,
    /// Maximum tokens per LLM response.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Hard stop on the number of orchestrator iterations.
    pub sanity_ceiling: u32,
    /// Root directory for session directories.
    pub sessions_dir: PathBuf,
}

impl OrchestratorSettings {
    /// Create settings with a model, leaving everything else at its default.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_sanity_ceiling(mut self, sanity_ceiling: u32) -> Self {
        self.sanity_ceiling = sanity_ceiling;
        self
    }

    pub fn with_sessions_dir(mut self, sessions_dir: impl Into<PathBuf>) -> Self {
        self.sessions_dir = sessions_dir.into();
        self
    }

    /// Build the [`OrchestratorConfig`](crate::orchestrator::OrchestratorConfig) these settings describe.
    pub fn to_orchestrator_config(&self) -> crate::orchestrator::OrchestratorConfig {
        crate::orchestrator::OrchestratorConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            sanity_ceiling: self.sanity_ceiling,
            ..Default::default()
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        let defaults = crate::orchestrator::OrchestratorConfig::default();
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            sanity_ceiling: defaults.sanity_ceiling,
            sessions_dir: PathBuf::from(".bailu/sessions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_defaults_besides_model() {
        let settings = OrchestratorSettings::new("test-model");
        assert_eq!(settings.model, "test-model");
        assert_eq!(settings.max_tokens, OrchestratorSettings::default().max_tokens);
    }

    #[test]
    fn builder_methods_override_fields() {
        let settings = OrchestratorSettings::new("m")
            .with_max_tokens(2048)
            .with_temperature(0.1)
            .with_sanity_ceiling(50)
            .with_sessions_dir("/tmp/sessions");

        assert_eq!(settings.max_tokens, 2048);
        assert_eq!(settings.temperature, 0.1);
        assert_eq!(settings.sanity_ceiling, 50);
        assert_eq!(settings.sessions_dir, PathBuf::from("/tmp/sessions"));
    }

    #[test]
    fn to_orchestrator_config_carries_model_and_limits() {
        let settings = OrchestratorSettings::new("m").with_max_tokens(777);
        let config = settings.to_orchestrator_config();
        assert_eq!(config.model, "m");
        assert_eq!(config.max_tokens, 777);
    }
}
