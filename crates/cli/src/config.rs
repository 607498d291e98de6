//! Configuration loading from tiller.toml.

use runtime::RuntimeConfig;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,

    /// Limits and policies for every run.
    pub runtime: RuntimeConfig,

    /// System prompt of the primary agent.
    pub system_prompt: Option<String>,

    /// Nested agents the primary agent can delegate to.
    pub agents: Vec<SubAgentConfig>,
}

/// Model provider configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub model: String,

    /// Anthropic API key; `ANTHROPIC_API_KEY` is used when unset.
    pub api_key: Option<String>,

    pub base_url: Option<String>,

    pub max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 4096,
        }
    }
}

/// One `[[agents]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SubAgentConfig {
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
    /// Allow several delegations to this agent in one round to run at once.
    #[serde(default)]
    pub parallel: bool,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config
            .runtime
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }

    /// Fill backend settings the file left out from the environment.
    ///
    /// `ANTHROPIC_API_KEY` applies only when the file has no key;
    /// `TILLER_MODEL` overrides the model.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if self.backend.api_key.is_none() {
            self.backend.api_key = var("ANTHROPIC_API_KEY");
        }
        if let Some(model) = var("TILLER_MODEL") {
            self.backend.model = model;
        }
        self
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.backend
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("API key not configured: set backend.api_key or ANTHROPIC_API_KEY")]
    MissingApiKey,
}
