//! Host-integrated models reached through the loopback bridge
//!
//! Client side: `HostBridgeProvider` and `BridgeRewriter` call the bridge.
//! Server side: `HostModelCatalog` holds the models the host exposes and
//! routes each call to a model family, falling back to another family only
//! when the requested one is not configured.

use super::{create_provider, http_client, send_json, ChatMessage, Generation, LlmProvider};
use crate::config::{BridgeConfig, LlmConfig, ProviderKind};
use crate::context::{finalize_terms, TermRewriter};
use crate::errors::{AppError, Result};
use crate::models::QueryRewriteResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PROVIDER: &str = "host";

/// Body of `POST /llm/generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub messages: Vec<ChatMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Body of `POST /llm/rewrite`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRequest {
    pub question: String,

    #[serde(default)]
    pub attempted: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

/// Provider that forwards chat calls to the bridge
pub struct HostBridgeProvider {
    client: reqwest::Client,
    base_url: String,
    family: Option<String>,
    cancel: Option<CancellationToken>,
}

impl HostBridgeProvider {
    pub fn new(base_url: &str, family: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(PROVIDER, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            family,
            cancel: None,
        })
    }

    /// Abort in-flight calls when `token` is cancelled
    pub(crate) fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[async_trait]
impl LlmProvider for HostBridgeProvider {
    async fn generate(&self, messages: &[ChatMessage], model_hint: Option<&str>) -> Result<Generation> {
        let body = GenerateRequest {
            messages: messages.to_vec(),
            family: self.family.clone(),
            model: model_hint.map(str::to_string),
        };
        let request = self
            .client
            .post(format!("{}/llm/generate", self.base_url))
            .json(&body);
        let call = send_json::<Generation>(PROVIDER, request);

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(AppError::provider(PROVIDER, "Request cancelled")),
                    result = call => result,
                }
            }
            None => call.await,
        }
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        self.family.as_deref().unwrap_or("host-default")
    }
}

/// Rewriter that lets the bridge pick the model and parse its output
pub struct BridgeRewriter {
    client: reqwest::Client,
    base_url: String,
    family: Option<String>,
}

impl BridgeRewriter {
    pub fn new(base_url: &str, family: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(PROVIDER, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            family,
        })
    }
}

#[async_trait]
impl TermRewriter for BridgeRewriter {
    async fn rewrite(&self, question: &str, attempted: &[String]) -> Option<QueryRewriteResult> {
        let body = RewriteRequest {
            question: question.to_string(),
            attempted: attempted.to_vec(),
            family: self.family.clone(),
        };
        let request = self
            .client
            .post(format!("{}/llm/rewrite", self.base_url))
            .json(&body);

        match send_json::<QueryRewriteResult>(PROVIDER, request).await {
            Ok(result) => {
                let terms = finalize_terms(result.terms, attempted);
                (!terms.is_empty()).then_some(QueryRewriteResult { terms, model: result.model })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Bridge rewrite failed");
                None
            }
        }
    }
}

/// One model the host makes available
#[derive(Clone)]
pub struct HostModel {
    pub family: String,
    pub provider: Arc<dyn LlmProvider>,
}

/// Models exposed through the bridge, grouped by family
pub struct HostModelCatalog {
    models: Vec<HostModel>,
    preferred_family: Option<String>,
}

impl HostModelCatalog {
    pub fn new(models: Vec<HostModel>, preferred_family: Option<String>) -> Self {
        Self { models, preferred_family }
    }

    /// Build every configured host model; host models must name a concrete backend
    pub fn from_config(bridge: &BridgeConfig, defaults: &LlmConfig) -> Result<Self> {
        let mut models = Vec::with_capacity(bridge.models.len());

        for entry in &bridge.models {
            if matches!(entry.provider, ProviderKind::None | ProviderKind::Host) {
                return Err(AppError::Configuration {
                    message: format!(
                        "Host model '{}' needs a concrete provider, not '{}'",
                        entry.model,
                        entry.provider.as_str()
                    ),
                });
            }

            if let Some(provider) = create_provider(&entry.to_llm_config(defaults))? {
                models.push(HostModel {
                    family: entry.family.to_lowercase(),
                    provider,
                });
            }
        }

        Ok(Self::new(models, bridge.preferred_family.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Distinct families in configuration order
    pub fn families(&self) -> Vec<&str> {
        let mut families: Vec<&str> = Vec::new();
        for model in &self.models {
            if !families.contains(&model.family.as_str()) {
                families.push(&model.family);
            }
        }
        families
    }

    /// First model of the wanted family, or the first available model when
    /// no model of that family is configured. The flag tells whether the
    /// wanted family matched.
    fn select(&self, family: Option<&str>) -> Option<(&HostModel, bool)> {
        let wanted = family
            .or(self.preferred_family.as_deref())
            .map(str::to_lowercase);

        wanted
            .as_deref()
            .and_then(|w| self.models.iter().find(|m| m.family == w))
            .map(|m| (m, true))
            .or_else(|| self.models.first().map(|m| (m, false)))
    }

    /// Generate with the wanted family, or any available family when it is absent.
    ///
    /// One call is made; a failing model is reported, not retried elsewhere.
    /// A model hint only applies to models of the wanted family.
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        family: Option<&str>,
        model_hint: Option<&str>,
    ) -> Result<Generation> {
        let Some((model, wanted)) = self.select(family) else {
            return Err(AppError::provider(PROVIDER, "No host models are available"));
        };

        if !wanted {
            tracing::debug!(family = %model.family, requested = ?family, "Requested family absent, using fallback");
        }

        let hint = if wanted { model_hint } else { None };
        model.provider.generate(messages, hint).await.map_err(|e| {
            tracing::warn!(
                family = %model.family,
                provider = model.provider.name(),
                error = %e,
                "Host model failed"
            );
            e
        })
    }

    /// Provider view bound to one family
    pub fn route(self: &Arc<Self>, family: Option<String>) -> FamilyRoute {
        FamilyRoute {
            catalog: Arc::clone(self),
            family,
        }
    }
}

/// `LlmProvider` over the catalog for one requested family
pub struct FamilyRoute {
    catalog: Arc<HostModelCatalog>,
    family: Option<String>,
}

#[async_trait]
impl LlmProvider for FamilyRoute {
    async fn generate(&self, messages: &[ChatMessage], model_hint: Option<&str>) -> Result<Generation> {
        self.catalog
            .generate(messages, self.family.as_deref(), model_hint)
            .await
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        self.catalog
            .select(self.family.as_deref())
            .map(|(m, _)| m.provider.default_model())
            .unwrap_or("none")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostModelConfig;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    struct FakeModel {
        name: &'static str,
        fail: bool,
        hints: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl LlmProvider for FakeModel {
        async fn generate(&self, _: &[ChatMessage], hint: Option<&str>) -> Result<Generation> {
            self.hints.lock().unwrap().push(hint.map(str::to_string));
            if self.fail {
                return Err(AppError::provider(self.name, "down"));
            }
            Ok(Generation {
                text: format!("from {}", self.name),
                model: hint.unwrap_or(self.name).to_string(),
                provider: self.name.to_string(),
                tokens_used: None,
            })
        }

        fn name(&self) -> &str {
            self.name
        }

        fn default_model(&self) -> &str {
            self.name
        }
    }

    fn model(family: &str, name: &'static str, fail: bool) -> (HostModel, Arc<FakeModel>) {
        let fake = Arc::new(FakeModel { name, fail, hints: Mutex::new(Vec::new()) });
        (HostModel { family: family.to_string(), provider: fake.clone() }, fake)
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hi")]
    }

    #[tokio::test]
    async fn test_preferred_family_first() {
        let (gpt, _) = model("gpt", "gpt-fake", false);
        let (claude, _) = model("claude", "claude-fake", false);
        let catalog = HostModelCatalog::new(vec![gpt, claude], Some("claude".to_string()));

        let g = catalog.generate(&messages(), None, None).await.unwrap();
        assert_eq!(g.text, "from claude-fake");

        let g = catalog.generate(&messages(), Some("GPT"), None).await.unwrap();
        assert_eq!(g.text, "from gpt-fake");
    }

    #[tokio::test]
    async fn test_missing_family_falls_back() {
        let (llama, _) = model("llama", "llama-fake", false);
        let catalog = HostModelCatalog::new(vec![llama], Some("claude".to_string()));

        let g = catalog.generate(&messages(), None, None).await.unwrap();
        assert_eq!(g.text, "from llama-fake");
    }

    #[tokio::test]
    async fn test_failing_family_is_reported_not_retried() {
        let (claude, claude_fake) = model("claude", "claude-fake", true);
        let (gpt, gpt_fake) = model("gpt", "gpt-fake", false);
        let catalog = HostModelCatalog::new(vec![claude, gpt], None);

        let err = assert_err!(catalog.generate(&messages(), Some("claude"), Some("claude-opus")).await);
        assert!(matches!(err, AppError::ProviderError { ref provider, .. } if provider == "claude-fake"));
        assert_eq!(claude_fake.hints.lock().unwrap().len(), 1);
        assert_eq!(claude_fake.hints.lock().unwrap()[0].as_deref(), Some("claude-opus"));
        assert!(gpt_fake.hints.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_absent_family_drops_hint() {
        let (gpt, gpt_fake) = model("gpt", "gpt-fake", false);
        let catalog = HostModelCatalog::new(vec![gpt], None);

        let g = assert_ok!(catalog.generate(&messages(), Some("claude"), Some("claude-opus")).await);
        assert_eq!(g.text, "from gpt-fake");
        assert_eq!(gpt_fake.hints.lock().unwrap()[0], None);
    }

    #[tokio::test]
    async fn test_empty_catalog_errors() {
        let catalog = HostModelCatalog::new(Vec::new(), None);
        let err = catalog.generate(&messages(), None, None).await.unwrap_err();
        assert!(matches!(err, AppError::ProviderError { .. }));
    }

    #[tokio::test]
    async fn test_route_is_a_provider() {
        let (gpt, _) = model("gpt", "gpt-fake", false);
        let catalog = Arc::new(HostModelCatalog::new(vec![gpt], None));
        let route = catalog.route(Some("gpt".to_string()));

        assert_eq!(route.default_model(), "gpt-fake");
        assert_eq!(route.generate(&messages(), None).await.unwrap().provider, "gpt-fake");
    }

    #[test]
    fn test_families_deduplicated() {
        let (a, _) = model("gpt", "a", false);
        let (b, _) = model("claude", "b", false);
        let (c, _) = model("gpt", "c", false);
        let catalog = HostModelCatalog::new(vec![a, b, c], None);
        assert_eq!(catalog.families(), vec!["gpt", "claude"]);
    }

    #[test]
    fn test_host_model_must_be_concrete() {
        let bridge = BridgeConfig {
            models: vec![HostModelConfig {
                family: "loop".to_string(),
                provider: ProviderKind::Host,
                model: "x".to_string(),
                base_url: None,
                api_key: None,
            }],
            ..BridgeConfig::default()
        };
        assert!(matches!(
            HostModelCatalog::from_config(&bridge, &LlmConfig::default()),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_bridge_rewrite_is_none() {
        let rewriter = BridgeRewriter::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        assert!(rewriter.rewrite("q", &[]).await.is_none());
    }
}
