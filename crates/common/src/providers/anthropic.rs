//! Anthropic messages API

use super::{http_client, send_json, ChatMessage, Generation, LlmProvider, Role};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<MessageParam<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.resolved_api_key().ok_or_else(|| AppError::Configuration {
            message: "Anthropic provider requires an API key (llm.api_key or ANTHROPIC_API_KEY)"
                .to_string(),
        })?;

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

    /// System messages move to the top-level `system` field
    fn build_request<'a>(&self, model: &'a str, messages: &'a [ChatMessage]) -> MessagesRequest<'a> {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        MessagesRequest {
            model,
            messages: messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| MessageParam {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, messages: &[ChatMessage], model_hint: Option<&str>) -> Result<Generation> {
        let model = model_hint.unwrap_or(&self.model);
        let body = self.build_request(model, messages);

        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: MessagesResponse = send_json(PROVIDER, request).await?;

        let text = response
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect::<String>();
        if text.is_empty() {
            return Err(AppError::provider(PROVIDER, "Response contained no text"));
        }

        Ok(Generation {
            text,
            model: response.model,
            provider: PROVIDER.to_string(),
            tokens_used: response.usage.map(|u| u.input_tokens + u.output_tokens),
        })
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn provider() -> AnthropicProvider {
        let config = LlmConfig {
            provider: ProviderKind::Anthropic,
            api_key: Some("sk-ant-test".to_string()),
            ..LlmConfig::default()
        };
        AnthropicProvider::new(&config).unwrap()
    }

    #[test]
    fn test_system_prompt_lifted_out() {
        let messages = vec![
            ChatMessage::system("You answer from memory."),
            ChatMessage::user("What database?"),
        ];
        let provider = provider();
        let json = serde_json::to_value(provider.build_request("claude", &messages)).unwrap();

        assert_eq!(json["system"], "You answer from memory.");
        let sent = json["messages"].as_array().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["role"], "user");
        assert_eq!(json["max_tokens"], 1024);
    }

    #[test]
    fn test_no_system_field_without_system_message() {
        let messages = vec![ChatMessage::user("hi")];
        let provider = provider();
        let json = serde_json::to_value(provider.build_request("claude", &messages)).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"content":[{"type":"text","text":"Post"},{"type":"text","text":"greSQL"}],"model":"claude-3-5-haiku","usage":{"input_tokens":10,"output_tokens":2}}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        let text: String = response.content.into_iter().filter_map(|b| b.text).collect();
        assert_eq!(text, "PostgreSQL");
    }
}
