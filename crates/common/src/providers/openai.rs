//! OpenAI chat completions, also used for OpenAI-compatible servers

use super::{http_client, send_json, ChatMessage, Generation, LlmProvider};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiProvider {
    /// The API key is mandatory for the public endpoint only; compatible
    /// servers behind a custom `base_url` may run without one.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.resolved_api_key();
        if api_key.is_none() && config.base_url.is_none() {
            return Err(AppError::Configuration {
                message: "OpenAI provider requires an API key (llm.api_key or OPENAI_API_KEY)"
                    .to_string(),
            });
        }

        Ok(Self {
            client: http_client(PROVIDER, Duration::from_secs(config.timeout_secs))?,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, messages: &[ChatMessage], model_hint: Option<&str>) -> Result<Generation> {
        let model = model_hint.unwrap_or(&self.model);
        let body = ChatRequest {
            model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: ChatResponse = send_json(PROVIDER, request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::provider(PROVIDER, "Response contained no message content"))?;

        Ok(Generation {
            text,
            model: response.model.unwrap_or_else(|| model.to_string()),
            provider: PROVIDER.to_string(),
            tokens_used: response.usage.map(|u| u.total_tokens),
        })
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
