//! Configuration management for context-memory
//!
//! Supports configuration via:
//! 1. Config file (~/.config/context-memory/config.toml)
//! 2. Environment variables (CONTEXT_MEMORY_MODEL, CONTEXT_MEMORY_MAX_TOKENS, etc.)
//! 3. CLI arguments (override file/env settings)

use crate::context::{ContextStrategy, MemoryConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model id used to pick a tokenizer
    pub model: String,

    /// Context budget and reduction settings
    pub memory: MemoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("context-memory")
            .join("config.toml")
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from specific path. A missing file yields defaults.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default().with_env_overrides());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("CONTEXT_MEMORY_MODEL") {
            self.model = model;
        }
        if let Some(tokens) = env_parse::<usize>("CONTEXT_MEMORY_MAX_TOKENS") {
            self.memory.max_context_tokens = tokens;
        }
        if let Some(strategy) = env_parse::<ContextStrategy>("CONTEXT_MEMORY_STRATEGY") {
            self.memory.strategy = strategy;
        }
        if let Some(keep) = env_parse::<usize>("CONTEXT_MEMORY_MIN_MESSAGES") {
            self.memory.min_messages_to_keep = keep;
        }

        self
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to specific path
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        self.memory
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Set a `section.key` value from its string form
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |e: &dyn std::fmt::Display| ConfigError::Invalid(format!("{}: {}", key, e));
        let memory = &mut self.memory;

        match key {
            "model" => self.model = value.to_string(),
            "memory.max_context_tokens" => {
                memory.max_context_tokens = value.parse().map_err(|e| invalid(&e))?
            }
            "memory.strategy" => memory.strategy = value.parse().map_err(|e| invalid(&e))?,
            "memory.summarize_threshold" => {
                memory.summarize_threshold = value.parse().map_err(|e| invalid(&e))?
            }
            "memory.min_messages_to_keep" => {
                memory.min_messages_to_keep = value.parse().map_err(|e| invalid(&e))?
            }
            "memory.enable_auto_summarization" => {
                memory.enable_auto_summarization = value.parse().map_err(|e| invalid(&e))?
            }
            "memory.summary_length" => {
                memory.summary_length = value.parse().map_err(|e| invalid(&e))?
            }
            _ => return Err(ConfigError::Invalid(format!("unknown key: {}", key))),
        }

        Ok(())
    }

    /// Generate example config content
    pub fn example() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

fn env_parse<T>(name: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                variable = name,
                value = %raw,
                error = %e,
                "Ignoring invalid environment override"
            );
            None
        }
    }
}

/// Builder for creating Config programmatically
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_context_tokens(mut self, tokens: usize) -> Self {
        self.config.memory.max_context_tokens = tokens;
        self
    }

    pub fn strategy(mut self, strategy: ContextStrategy) -> Self {
        self.config.memory.strategy = strategy;
        self
    }

    pub fn summarize_threshold(mut self, tokens: usize) -> Self {
        self.config.memory.summarize_threshold = tokens;
        self
    }

    pub fn min_messages_to_keep(mut self, count: usize) -> Self {
        self.config.memory.min_messages_to_keep = count;
        self
    }

    pub fn auto_summarization(mut self, enabled: bool) -> Self {
        self.config.memory.enable_auto_summarization = enabled;
        self
    }

    pub fn summary_length(mut self, tokens: usize) -> Self {
        self.config.memory.summary_length = tokens;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.memory.max_context_tokens, 4000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .model("gpt-4")
            .max_context_tokens(16000)
            .strategy(ContextStrategy::KeepRecent)
            .summarize_threshold(12000)
            .min_messages_to_keep(6)
            .build();

        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.memory.max_context_tokens, 16000);
        assert_eq!(config.memory.strategy, ContextStrategy::KeepRecent);
        assert_eq!(config.memory.summarize_threshold, 12000);
        assert_eq!(config.memory.min_messages_to_keep, 6);
    }

    #[test]
    fn test_example_config() {
        let example = Config::example();
        assert!(example.contains("[memory]"));
        assert!(example.contains("strategy = \"sliding_window\""));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            "[memory]\nmax_context_tokens = 8000\nstrategy = \"truncate_oldest\"\n",
        )
        .unwrap();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.memory.max_context_tokens, 8000);
        assert_eq!(config.memory.strategy, ContextStrategy::TruncateOldest);
        assert_eq!(config.memory.summary_length, 200);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = ConfigBuilder::new().summary_length(120).build();

        config.save_to(path.clone()).unwrap();
        let loaded: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_set_values() {
        let mut config = Config::default();
        config.set("memory.strategy", "keep_recent").unwrap();
        config.set("memory.min_messages_to_keep", "2").unwrap();
        config.set("model", "gpt-4").unwrap();

        assert_eq!(config.memory.strategy, ContextStrategy::KeepRecent);
        assert_eq!(config.memory.min_messages_to_keep, 2);
        assert_eq!(config.model, "gpt-4");

        assert!(config.set("memory.max_context_tokens", "lots").is_err());
        assert!(config.set("memory.strategy", "newest").is_err());
        assert!(config.set("memory.preserve_system_prompt", "true").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let config = ConfigBuilder::new().max_context_tokens(0).build();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
