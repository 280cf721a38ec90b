//! Language-model provider adapters
//!
//! One facade, `generate(messages, model_hint)`, over a closed set of
//! backends chosen once at startup:
//! - OpenAI and OpenAI-compatible chat completions
//! - Anthropic messages
//! - Local Ollama daemon
//! - Host-integrated models behind the loopback bridge

mod anthropic;
mod host;
mod ollama;
mod openai;

pub use anthropic::AnthropicProvider;
pub use host::{
    BridgeRewriter, FamilyRoute, GenerateRequest, HostBridgeProvider, HostModel, HostModelCatalog,
    RewriteRequest,
};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::config::{LlmConfig, ProviderKind};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Bridge address used when the host provider has no explicit base URL
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:7878";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Text produced by one provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,

    /// Model that actually answered
    pub model: String,

    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

/// Uniform chat interface over every backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one chat exchange. `model_hint` overrides the configured model.
    async fn generate(&self, messages: &[ChatMessage], model_hint: Option<&str>) -> Result<Generation>;

    /// Provider identity, e.g. "openai"
    fn name(&self) -> &str;

    /// Model used when no hint is given
    fn default_model(&self) -> &str;
}

/// Build the configured provider; `None` when no provider is configured
pub fn create_provider(config: &LlmConfig) -> Result<Option<Arc<dyn LlmProvider>>> {
    build_provider(config, None)
}

/// Like [`create_provider`], but bridge calls abort once `token` is cancelled
pub fn create_cancellable_provider(
    config: &LlmConfig,
    token: CancellationToken,
) -> Result<Option<Arc<dyn LlmProvider>>> {
    build_provider(config, Some(token))
}

fn build_provider(
    config: &LlmConfig,
    cancel: Option<CancellationToken>,
) -> Result<Option<Arc<dyn LlmProvider>>> {
    let provider: Arc<dyn LlmProvider> = match config.provider {
        ProviderKind::None => return Ok(None),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config)?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(config)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config)?),
        ProviderKind::Host => {
            let host = HostBridgeProvider::new(
                config.base_url.as_deref().unwrap_or(DEFAULT_BRIDGE_URL),
                None,
                Duration::from_secs(config.timeout_secs),
            )?;
            match cancel {
                Some(token) => Arc::new(host.with_cancellation(token)),
                None => Arc::new(host),
            }
        }
    };

    tracing::info!(
        provider = provider.name(),
        model = provider.default_model(),
        "Language model provider configured"
    );
    Ok(Some(provider))
}

pub(crate) fn http_client(provider: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::provider(provider, format!("Failed to create HTTP client: {}", e)))
}

/// Send a request and decode a JSON body, mapping every failure to `ProviderError`
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let start = Instant::now();
    let result = async {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::provider(provider, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::provider(
                provider,
                format!("Upstream returned {}: {}", status, truncate(&body, 500)),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::provider(provider, format!("Malformed response: {}", e)))
    }
    .await;

    metrics::record_provider_call(provider, start.elapsed().as_secs_f64(), result.is_ok());
    result
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
