//! Answer synthesis from retrieved memories
//!
//! Provides:
//! - Prompt construction through the context formatter
//! - One provider call per question
//! - Model, provider and token usage reporting

use super::formatter::{build_messages, format_context};
use crate::errors::{AppError, Result};
use crate::models::{AskResult, SearchHit};
use crate::providers::LlmProvider;
use std::sync::Arc;

/// Turns a question and its hits into an answer, when a provider is configured
#[derive(Clone, Default)]
pub struct AnswerSynthesizer {
    provider: Option<Arc<dyn LlmProvider>>,

    /// Configured persona, used when the caller gives none
    persona: Option<String>,

    model_hint: Option<String>,
}

impl AnswerSynthesizer {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            provider,
            persona: None,
            model_hint: None,
        }
    }

    pub fn with_persona(mut self, persona: Option<String>) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model_hint = model;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.provider.as_ref()
    }

    /// Synthesize an answer.
    ///
    /// `Ok(None)` means no provider is configured and the caller should show
    /// the raw context. Provider failures are returned as errors.
    pub async fn synthesize(
        &self,
        question: &str,
        hits: &[SearchHit],
        persona_override: Option<&str>,
    ) -> Result<Option<AskResult>> {
        let Some(provider) = &self.provider else {
            return Ok(None);
        };

        let persona = persona_override.or(self.persona.as_deref());
        let messages = build_messages(question, hits, persona);

        tracing::debug!(
            provider = provider.name(),
            hits = hits.len(),
            "Synthesizing answer"
        );

        let generation = provider.generate(&messages, self.model_hint.as_deref()).await?;
        let answer = generation.text.trim().to_string();
        if answer.is_empty() {
            return Err(AppError::AskError {
                message: format!("{} returned an empty answer", generation.provider),
            });
        }

        Ok(Some(AskResult {
            answer,
            context: Some(hits.to_vec()),
            model: Some(generation.model),
            provider: Some(generation.provider),
            tokens_used: generation.tokens_used,
        }))
    }

    /// Context-only result used when no answer could be synthesized
    pub fn context_only(hits: &[SearchHit]) -> AskResult {
        AskResult {
            answer: format_context(hits),
            context: Some(hits.to_vec()),
            model: None,
            provider: None,
            tokens_used: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::formatter::DEFAULT_PERSONA;
    use crate::providers::{ChatMessage, Generation};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingProvider {
        reply: Option<String>,
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn generate(&self, messages: &[ChatMessage], _: Option<&str>) -> Result<Generation> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            match &self.reply {
                Some(text) => Ok(Generation {
                    text: text.clone(),
                    model: "test-model".to_string(),
                    provider: "test".to_string(),
                    tokens_used: Some(42),
                }),
                None => Err(AppError::provider("test", "upstream 500")),
            }
        }

        fn name(&self) -> &str {
            "test"
        }

        fn default_model(&self) -> &str {
            "test-model"
        }
    }

    fn hits() -> Vec<SearchHit> {
        vec![SearchHit {
            id: "1".to_string(),
            title: "DB choice".to_string(),
            score: 2.0,
            snippet: "Uses PostgreSQL".to_string(),
            label: "decision".to_string(),
            metadata: serde_json::json!({}),
        }]
    }

    fn provider(reply: Option<&str>) -> Arc<RecordingProvider> {
        Arc::new(RecordingProvider {
            reply: reply.map(str::to_string),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_no_provider_is_absent() {
        let synth = AnswerSynthesizer::new(None);
        assert!(!synth.is_configured());
        assert!(synth.synthesize("q", &hits(), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_answer_carries_identity_and_usage() {
        let provider = provider(Some(" PostgreSQL. [1] "));
        let synth = AnswerSynthesizer::new(Some(provider.clone()));

        let result = synth.synthesize("Which DB?", &hits(), None).await.unwrap().unwrap();
        assert_eq!(result.answer, "PostgreSQL. [1]");
        assert_eq!(result.model.as_deref(), Some("test-model"));
        assert_eq!(result.provider.as_deref(), Some("test"));
        assert_eq!(result.tokens_used, Some(42));
        assert_eq!(result.context.unwrap().len(), 1);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].content, DEFAULT_PERSONA);
    }

    #[tokio::test]
    async fn test_persona_precedence() {
        let provider = provider(Some("ok"));
        let synth = AnswerSynthesizer::new(Some(provider.clone()))
            .with_persona(Some("configured".to_string()));

        synth.synthesize("q", &hits(), Some("override")).await.unwrap();
        synth.synthesize("q", &hits(), None).await.unwrap();

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].content, "override");
        assert_eq!(seen[2].content, "configured");
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let synth = AnswerSynthesizer::new(Some(provider(None)));
        let err = synth.synthesize("q", &hits(), None).await.unwrap_err();
        assert!(matches!(err, AppError::ProviderError { .. }));
    }

    #[tokio::test]
    async fn test_blank_answer_is_ask_error() {
        let synth = AnswerSynthesizer::new(Some(provider(Some("   "))));
        let err = synth.synthesize("q", &hits(), None).await.unwrap_err();
        assert!(matches!(err, AppError::AskError { .. }));
    }

    #[test]
    fn test_context_only_has_no_model() {
        let result = AnswerSynthesizer::context_only(&hits());
        assert!(result.model.is_none());
        assert!(result.answer.contains("Uses PostgreSQL"));
    }
}
