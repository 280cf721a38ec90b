//! Configuration management for memvid-mcp
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with MEMVID__)
//! - Configuration files (config/default, config/{env}, config/local)
//! - Default values

use crate::models::SearchMode;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Tool server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Memory file location
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Search tunables
    #[serde(default)]
    pub search: SearchConfig,

    /// Language-model provider used for rewriting and synthesis
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding provider used by the store for semantic ranking
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Loopback bridge to host-integrated models
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Explicit memory file; wins over every other location
    pub path: Option<PathBuf>,

    /// Project root for the project-local memory file (defaults to the working directory)
    pub project_dir: Option<PathBuf>,

    /// Directory of the global fallback memory file (defaults to ~/.memvid)
    pub global_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Hits returned by memvid_search when no limit is given
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Hits handed to answer synthesis when no contextLimit is given
    #[serde(default = "default_ask_context_limit")]
    pub ask_context_limit: usize,

    /// Snippet length in characters
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// Ranking mode: lex, sem, auto
    #[serde(default)]
    pub mode: SearchMode,

    /// Minimum cosine similarity for semantic hits
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
}

/// Language-model backend identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// No provider; ask falls back to raw context
    #[default]
    None,
    /// OpenAI or any OpenAI-compatible chat completion endpoint
    #[serde(alias = "openai-compatible")]
    OpenAi,
    /// Anthropic messages API
    Anthropic,
    /// Local Ollama chat daemon
    Ollama,
    /// Host-integrated models behind the loopback bridge
    Host,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::None => "none",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Host => "host",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: none, openai, anthropic, ollama, host
    #[serde(default)]
    pub provider: ProviderKind,

    /// API key (falls back to OPENAI_API_KEY / ANTHROPIC_API_KEY)
    pub api_key: Option<String>,

    /// Model to use (provider default when unset)
    pub model: Option<String>,

    /// API base URL (for custom endpoints)
    pub base_url: Option<String>,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Persona prompt override for answer synthesis
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: none, openai
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub base_url: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Loopback address to bind / connect to
    #[serde(default = "default_bridge_host")]
    pub host: String,

    /// Port to bind / connect to
    #[serde(default = "default_bridge_port")]
    pub port: u16,

    /// Model family tried first (falls back to any available family)
    pub preferred_family: Option<String>,

    /// Models the host makes available
    #[serde(default)]
    pub models: Vec<HostModelConfig>,
}

/// One host-integrated model
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostModelConfig {
    /// Family name used for selection, e.g. "claude", "gpt", "llama"
    pub family: String,

    /// Backend that serves this model (openai, anthropic, ollama)
    pub provider: ProviderKind,

    /// Model identifier at the backend
    pub model: String,

    pub base_url: Option<String>,

    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Prometheus exporter port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,
}

// Default value functions
fn default_request_timeout() -> u64 { 120 }
fn default_search_limit() -> usize { crate::DEFAULT_SEARCH_LIMIT }
fn default_ask_context_limit() -> usize { 5 }
fn default_snippet_chars() -> usize { 200 }
fn default_min_similarity() -> f32 { 0.3 }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.2 }
fn default_llm_timeout() -> u64 { 60 }
fn default_embedding_provider() -> String { "none".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_timeout() -> u64 { 30 }
fn default_bridge_host() -> String { "127.0.0.1".to_string() }
fn default_bridge_port() -> u16 { 7878 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            ask_context_limit: default_ask_context_limit(),
            snippet_chars: default_snippet_chars(),
            mode: SearchMode::default(),
            min_similarity: default_min_similarity(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::None,
            api_key: None,
            model: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            system_prompt: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            base_url: None,
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_bridge_host(),
            port: default_bridge_port(),
            preferred_family: None,
            models: Vec::new(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("MEMVID_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with MEMVID__ prefix
            // e.g., MEMVID__LLM__PROVIDER=anthropic
            .add_source(
                Environment::with_prefix("MEMVID")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("MEMVID")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Base URL of the loopback bridge
    pub fn bridge_url(&self) -> String {
        format!("http://{}:{}", self.bridge.host, self.bridge.port)
    }
}

impl LlmConfig {
    /// API key from config, falling back to the provider's conventional variable
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_api_key(self.provider, self.api_key.as_deref())
    }
}

impl HostModelConfig {
    /// Provider settings for this host model, inheriting generation limits
    pub fn to_llm_config(&self, defaults: &LlmConfig) -> LlmConfig {
        LlmConfig {
            provider: self.provider,
            api_key: self.api_key.clone(),
            model: Some(self.model.clone()),
            base_url: self.base_url.clone(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            timeout_secs: defaults.timeout_secs,
            system_prompt: None,
        }
    }
}

/// Explicit key wins; otherwise the provider's conventional environment variable.
pub fn resolve_api_key(provider: ProviderKind, explicit: Option<&str>) -> Option<String> {
    if let Some(key) = explicit.filter(|k| !k.trim().is_empty()) {
        return Some(key.to_string());
    }
    let var = match provider {
        ProviderKind::OpenAi => "OPENAI_API_KEY",
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        _ => return None,
    };
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}
