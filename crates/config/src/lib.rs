//! Configuration loading, validation, and management for agentwire.
//!
//! Loads configuration from `~/.agentwire/config.toml` (or the path in
//! `AGENTWIRE_CONFIG`) with environment variable overrides. Validates all
//! settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default model backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// Provider-specific overrides, keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub toolkits: ToolkitsConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub tool_cache: ToolCacheConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// API key for the default provider (can be overridden per provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Model name on the chat-completions route that means "the configured default"
    #[serde(default = "default_model_alias")]
    pub model_alias: String,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Upper bound on remembered sessions; the least recently used is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_model_alias() -> String {
    "agentwire".into()
}
fn default_max_sessions() -> usize {
    1000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            model_alias: default_model_alias(),
            cors_origins: Vec::new(),
            max_sessions: default_max_sessions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolkitsConfig {
    /// Toolkits loaded when a request names none
    #[serde(default = "default_toolkits")]
    pub default_toolkits: Vec<String>,
}

fn default_toolkits() -> Vec<String> {
    vec!["web".into()]
}

impl Default for ToolkitsConfig {
    fn default() -> Self {
        Self {
            default_toolkits: default_toolkits(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    #[serde(default = "default_sub_agent_max_steps")]
    pub sub_agent_max_steps: u32,

    /// Per-step timeout applied when a request does not set one
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Optional bound on a single tool invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_timeout_secs: Option<u64>,
}

fn default_max_steps() -> u32 {
    8
}
fn default_sub_agent_max_steps() -> u32 {
    6
}
fn default_timeout_secs() -> u64 {
    120
}

impl AgentConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            sub_agent_max_steps: default_sub_agent_max_steps(),
            default_timeout_secs: default_timeout_secs(),
            tool_timeout_secs: None,
        }
    }
}

/// Lifetime of tool result caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// A fresh cache per request
    #[default]
    Request,
    /// One cache per session id, shared by that session's requests
    Session,
    /// No caching
    Disabled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCacheConfig {
    #[serde(default)]
    pub scope: CacheScope,

    /// Entries older than this are ignored; unset means they never expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl ToolCacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Load configuration from `AGENTWIRE_CONFIG` or `~/.agentwire/config.toml`,
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`AppConfig::load`], reading `path` instead of the default location when given.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    ///
    /// API key precedence: `AGENTWIRE_API_KEY`, `OPENROUTER_API_KEY`,
    /// `OPENAI_API_KEY`, and only when the file set none.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = ["AGENTWIRE_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"]
                .into_iter()
                .find_map(&lookup);
        }
        if let Some(provider) = lookup("AGENTWIRE_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = lookup("AGENTWIRE_MODEL") {
            self.llm.model = model;
        }
        if let Some(toolkits) = lookup("AGENTWIRE_TOOLKITS") {
            self.toolkits.default_toolkits = split_list(&toolkits);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentwire")
    }

    /// The config file `load` reads: `AGENTWIRE_CONFIG`, else `config.toml` in [`AppConfig::config_dir`].
    pub fn config_path() -> PathBuf {
        std::env::var("AGENTWIRE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_steps == 0 || self.agent.sub_agent_max_steps == 0 {
            return Err(ConfigError::ValidationError("agent step limits must be at least 1".into()));
        }
        if self.agent.default_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.default_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.gateway.max_sessions == 0 {
            return Err(ConfigError::ValidationError("gateway.max_sessions must be at least 1".into()));
        }
        Ok(())
    }

    /// Resolve the API key for a provider: its own entry first, then `[llm]`.
    pub fn api_key_for(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.as_deref())
            .or(self.llm.api_key.as_deref())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
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
