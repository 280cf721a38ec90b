//! Bridge HTTP routes

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use memvid_common::{
    context::{QueryRewriter, TermRewriter},
    errors::{AppError, Result},
    metrics::RequestMetrics,
    models::QueryRewriteResult,
    providers::{GenerateRequest, Generation, HostModelCatalog, LlmProvider, RewriteRequest},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<HostModelCatalog>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn create_router(state: AppState, timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/llm/generate", post(generate))
        .route("/llm/rewrite", post(rewrite))
        .fallback(not_found)
        .layer(middleware::from_fn(track_metrics))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve the listen address; anything but a loopback address is refused
pub fn bind_address(host: &str, port: u16) -> Result<SocketAddr> {
    let ip = if host.eq_ignore_ascii_case("localhost") {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        host.parse::<IpAddr>().map_err(|_| AppError::Configuration {
            message: format!("bridge.host '{}' is not an IP address", host),
        })?
    };

    if !ip.is_loopback() {
        return Err(AppError::Configuration {
            message: format!("bridge.host '{}' is not a loopback address", host),
        });
    }

    Ok(SocketAddr::new(ip, port))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub families: Vec<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let families: Vec<String> = state.catalog.families().into_iter().map(str::to_string).collect();
    Json(HealthResponse {
        status: if families.is_empty() { "degraded" } else { "healthy" }.to_string(),
        families,
    })
}

pub async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.map(|handle| handle.render()).unwrap_or_default()
}

pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Generation>> {
    if request.messages.is_empty() {
        return Err(AppError::Validation {
            message: "messages must not be empty".to_string(),
            field: Some("messages".to_string()),
        });
    }

    let generation = state
        .catalog
        .generate(&request.messages, request.family.as_deref(), request.model.as_deref())
        .await?;

    tracing::info!(
        provider = %generation.provider,
        model = %generation.model,
        tokens = ?generation.tokens_used,
        "Generation served"
    );
    Ok(Json(generation))
}

/// Rewrite with the requested family. No usable terms is an empty list, not an error.
pub async fn rewrite(
    State(state): State<AppState>,
    Json(request): Json<RewriteRequest>,
) -> Result<Json<QueryRewriteResult>> {
    if request.question.trim().is_empty() {
        return Err(AppError::Validation {
            message: "question must not be empty".to_string(),
            field: Some("question".to_string()),
        });
    }

    let route = Arc::new(state.catalog.route(request.family));
    let model = route.default_model().to_string();
    let rewriter = QueryRewriter::new(route);

    let result = rewriter
        .rewrite(&request.question, &request.attempted)
        .await
        .unwrap_or(QueryRewriteResult { terms: Vec::new(), model });

    Ok(Json(result))
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let timer = RequestMetrics::start(request.method().as_str(), request.uri().path());
    let response = next.run(request).await;
    timer.finish(response.status().as_u16());
    response
}

/// Fallback for unknown paths
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memvid_common::providers::{ChatMessage, HostModel};
    use tokio_test::{assert_err, assert_ok};

    struct CannedModel {
        reply: &'static str,
    }

    #[async_trait]
    impl LlmProvider for CannedModel {
        async fn generate(&self, _: &[ChatMessage], hint: Option<&str>) -> Result<Generation> {
            Ok(Generation {
                text: self.reply.to_string(),
                model: hint.unwrap_or("canned-1").to_string(),
                provider: "canned".to_string(),
                tokens_used: Some(9),
            })
        }

        fn name(&self) -> &str {
            "canned"
        }

        fn default_model(&self) -> &str {
            "canned-1"
        }
    }

    fn state(reply: &'static str) -> AppState {
        let model = HostModel {
            family: "claude".to_string(),
            provider: Arc::new(CannedModel { reply }),
        };
        AppState {
            catalog: Arc::new(HostModelCatalog::new(vec![model], None)),
            metrics: None,
        }
    }

    #[test]
    fn test_loopback_only() {
        assert!(bind_address("127.0.0.1", 7878).is_ok());
        assert!(bind_address("::1", 7878).is_ok());
        assert_eq!(bind_address("localhost", 1).unwrap().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(matches!(bind_address("0.0.0.0", 7878), Err(AppError::Configuration { .. })));
        assert!(matches!(bind_address("example.com", 7878), Err(AppError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_health_lists_families() {
        let Json(health) = health(State(state("x"))).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.families, vec!["claude"]);
    }

    #[tokio::test]
    async fn test_generate_passes_model_hint() {
        let request = GenerateRequest {
            messages: vec![ChatMessage::user("hi")],
            family: Some("claude".to_string()),
            model: Some("claude-sonnet".to_string()),
        };
        let Json(generation) = assert_ok!(generate(State(state("hello")), Json(request)).await);
        assert_eq!(generation.text, "hello");
        assert_eq!(generation.model, "claude-sonnet");
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_messages() {
        let request = GenerateRequest { messages: Vec::new(), family: None, model: None };
        let err = assert_err!(generate(State(state("x")), Json(request)).await);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rewrite_parses_model_output() {
        let request = RewriteRequest {
            question: "Welche Datenbank?".to_string(),
            attempted: vec!["datenbank".to_string()],
            family: None,
        };
        let Json(result) = rewrite(State(state("[\"datenbank\", \"postgresql\"]")), Json(request))
            .await
            .unwrap();
        assert_eq!(result.terms, vec!["postgresql"]);
        assert_eq!(result.model, "canned-1");
    }

    #[tokio::test]
    async fn test_rewrite_without_terms_is_empty() {
        let request = RewriteRequest {
            question: "anything".to_string(),
            attempted: Vec::new(),
            family: None,
        };
        let Json(result) = rewrite(State(state("")), Json(request)).await.unwrap();
        assert!(result.terms.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_without_recorder_is_empty() {
        assert!(render_metrics(State(state("x"))).await.is_empty());
    }
}
