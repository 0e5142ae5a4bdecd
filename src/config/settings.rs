//! Configuration settings for Tolk.

use crate::error::{Result, TolkError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub model: ModelSettings,
    pub agent: AgentSettings,
    pub threads: ThreadSettings,
    pub tools: ToolSettings,
    pub server: ServerSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.tolk".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Chat model identifier.
    pub model: String,
    /// Alternative OpenAI-compatible API base URL.
    pub api_base: Option<String>,
    /// API key. Prefer the OPENAI_API_KEY environment variable.
    pub api_key: Option<String>,
    /// Timeout for a single model call, in seconds.
    pub timeout_seconds: u64,
    /// Sampling temperature (model default when unset).
    pub temperature: Option<f32>,
    /// System prompt prepended to every request.
    pub system_prompt: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: None,
            api_key: None,
            timeout_seconds: 300,
            temperature: None,
            system_prompt: None,
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum number of tool rounds in a single turn.
    pub max_rounds: usize,
    /// Run the tool calls of one round concurrently.
    pub parallel_tool_calls: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: 15,
            parallel_tool_calls: true,
        }
    }
}

/// Thread store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadSettings {
    /// Maximum number of threads kept in memory (unbounded when unset).
    pub max_threads: Option<usize>,
    /// Evict threads idle for longer than this many seconds.
    pub idle_ttl_seconds: Option<u64>,
    /// Journal thread history to SQLite.
    pub persist: bool,
    /// Path to the SQLite journal (when `persist` is enabled).
    pub sqlite_path: String,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            max_threads: None,
            idle_ttl_seconds: None,
            persist: false,
            sqlite_path: "~/.tolk/threads.db".to_string(),
        }
    }
}

/// Tool settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToolSettings {
    pub search: SearchSettings,
}

/// Web search tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Serper API key. Prefer the SERPER_API_KEY environment variable.
    pub api_key: Option<String>,
    /// Search endpoint.
    pub endpoint: String,
    /// Number of organic results to request.
    pub num_results: u32,
    /// Country code.
    pub gl: String,
    /// Language code.
    pub hl: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://google.serper.dev/search".to_string(),
            num_results: 5,
            gl: "us".to_string(),
            hl: "en".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// HTTP chat server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    ///
    /// Environment variables override file values.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(model) = lookup("TOLK_MODEL") {
            self.model.model = model;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(base) = lookup("OPENAI_BASE_URL") {
            self.model.api_base = Some(base);
        }
        if let Some(key) = lookup("SERPER_API_KEY") {
            self.tools.search.api_key = Some(key);
        }
    }

    /// Check values that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_rounds == 0 {
            return Err(TolkError::Config("agent.max_rounds must be at least 1".to_string()));
        }
        if self.model.timeout_seconds == 0 {
            return Err(TolkError::Config(
                "model.timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.tools.search.timeout_seconds == 0 {
            return Err(TolkError::Config(
                "tools.search.timeout_seconds must be at least 1".to_string(),
            ));
        }
        if let Some(base) = &self.model.api_base {
            url::Url::parse(base).map_err(|e| {
                TolkError::Config(format!("Invalid model.api_base '{}': {}", base, e))
            })?;
        }
        url::Url::parse(&self.tools.search.endpoint).map_err(|e| {
            TolkError::Config(format!(
                "Invalid tools.search.endpoint '{}': {}",
                self.tools.search.endpoint, e
            ))
        })?;
        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TolkError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tolk")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded thread journal path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.threads.sqlite_path)
    }

    /// Resolved model API key, if any.
    pub fn model_api_key(&self) -> Option<String> {
        self.model.api_key.clone().filter(|k| !k.is_empty())
    }

    /// Resolved search API key, if any.
    pub fn search_api_key(&self) -> Option<String> {
        self.tools.search.api_key.clone().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.model.model, "gpt-4o-mini");
        assert_eq!(settings.agent.max_rounds, 15);
        assert_eq!(settings.server.port, 7860);
        assert!(!settings.threads.persist);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [agent]
            max_rounds = 3

            [tools.search]
            num_results = 8
            "#,
        )
        .unwrap();

        assert_eq!(settings.agent.max_rounds, 3);
        assert!(settings.agent.parallel_tool_calls);
        assert_eq!(settings.tools.search.num_results, 8);
        assert_eq!(settings.tools.search.gl, "us");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TOLK_MODEL", "gpt-4.1"),
            ("OPENAI_API_KEY", "sk-test"),
            ("SERPER_API_KEY", ""),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.model.model, "gpt-4.1");
        assert_eq!(settings.model_api_key().as_deref(), Some("sk-test"));
        assert!(settings.search_api_key().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.agent.max_rounds = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.model.api_base = Some("not a url".to_string());
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.tools.search.timeout_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.agent.max_rounds = 4;
        settings.save_to(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: Settings = toml::from_str(&content).unwrap();
        assert_eq!(loaded.agent.max_rounds, 4);
    }
}
