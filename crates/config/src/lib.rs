//! Configuration loading, validation, and management for StepForge.
//!
//! Loads configuration from `~/.stepforge/config.toml` with environment
//! variable overrides. Validates all settings at startup. Template override
//! files are loaded by the [`templates`] module.

pub mod templates;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use templates::{load_template_dir, load_template_file, template_layers};

/// The root configuration structure.
///
/// Maps directly to `~/.stepforge/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used by templates that leave `model` empty
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Step and parser limits
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Where template override files live
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Identifiers recorded on every tracked agent
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}

/// Runtime limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Model steps an agent may take before its turn is forced to end
    #[serde(default = "default_max_agent_steps")]
    pub max_agent_steps: u32,

    /// Longest tag candidate (in bytes) the parser will wait for
    #[serde(default = "default_max_tag_len")]
    pub max_tag_len: usize,

    /// Timeout for one client-executed tool round trip
    #[serde(default = "default_client_tool_timeout_secs")]
    pub client_tool_timeout_secs: u64,
}

fn default_max_agent_steps() -> u32 {
    25
}
fn default_max_tag_len() -> usize {
    4096
}
fn default_client_tool_timeout_secs() -> u64 {
    30
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_agent_steps: default_max_agent_steps(),
            max_tag_len: default_max_tag_len(),
            client_tool_timeout_secs: default_client_tool_timeout_secs(),
        }
    }
}

/// Template override sources, listed lowest precedence first after the
/// built-ins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Directories scanned for discovered templates
    #[serde(default)]
    pub discovered_dirs: Vec<PathBuf>,

    /// Project-local directory, relative to the working directory
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".stepforge/agents")
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            discovered_dirs: Vec::new(),
            project_dir: default_project_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_id")]
    pub session_id: String,

    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_session_id() -> String {
    "local".into()
}
fn default_user_id() -> String {
    "local-user".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            user_id: default_user_id(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepforge/config.toml).
    ///
    /// Environment variables override the file:
    /// - `STEPFORGE_MODEL`
    /// - `STEPFORGE_MAX_STEPS`
    /// - `STEPFORGE_CLIENT_TIMEOUT_SECS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in
    /// [`AppConfig::load`]).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(model) = lookup("STEPFORGE_MODEL") {
            self.default_model = model;
        }
        if let Some(steps) = lookup("STEPFORGE_MAX_STEPS") {
            self.runtime.max_agent_steps = parse_env("STEPFORGE_MAX_STEPS", &steps)?;
        }
        if let Some(secs) = lookup("STEPFORGE_CLIENT_TIMEOUT_SECS") {
            self.runtime.client_tool_timeout_secs = parse_env("STEPFORGE_CLIENT_TIMEOUT_SECS", &secs)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepforge")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.max_agent_steps == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.max_agent_steps must be at least 1".into(),
            ));
        }

        if self.runtime.max_tag_len < 16 {
            return Err(ConfigError::ValidationError(
                "runtime.max_tag_len must be at least 16".into(),
            ));
        }

        if self.runtime.client_tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.client_tool_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            runtime: RuntimeConfig::default(),
            templates: TemplatesConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} must be a positive integer, got {value:?}")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.runtime.max_agent_steps, 25);
        assert_eq!(config.runtime.max_tag_len, 4096);
        assert_eq!(config.templates.project_dir, PathBuf::from(".stepforge/agents"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.runtime.client_tool_timeout_secs, 30);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str("[runtime]\nmax_agent_steps = 3\n").unwrap();
        assert_eq!(parsed.runtime.max_agent_steps, 3);
        assert_eq!(parsed.runtime.max_tag_len, 4096);
        assert_eq!(parsed.session.session_id, "local");
    }

    #[test]
    fn zero_steps_rejected() {
        let mut config = AppConfig::default();
        config.runtime.max_agent_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.runtime.max_agent_steps, 25);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "runtime = [").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STEPFORGE_MODEL", "test/model"),
            ("STEPFORGE_MAX_STEPS", "7"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.default_model, "test/model");
        assert_eq!(config.runtime.max_agent_steps, 7);
        assert_eq!(config.runtime.client_tool_timeout_secs, 30);
    }

    #[test]
    fn bad_env_value_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|key| (key == "STEPFORGE_MAX_STEPS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("STEPFORGE_MAX_STEPS"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_agent_steps = 25"));
        assert!(toml_str.contains(".stepforge/agents"));
    }
}
