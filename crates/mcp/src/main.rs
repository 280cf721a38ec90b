//! memvid-mcp Tool Server
//!
//! Exposes the project memory to a coding agent over stdio:
//! - Store, search, ask, timeline and stats tools
//! - Tiered search fallback with optional query rewriting
//! - Answer synthesis through the configured language model
//!
//! stdout carries the protocol; all logs go to stderr.

mod handlers;
mod protocol;
mod server;
mod tools;

use handlers::ToolHandlers;
use memvid_common::{
    config::{AppConfig, ProviderKind},
    context::{AnswerSynthesizer, QueryRewriter, TermRewriter},
    db::{resolve_location, MemoryStore},
    embeddings::create_embedder,
    metrics,
    providers::{create_cancellable_provider, BridgeRewriter, LlmProvider},
    SqliteStore,
};
use memvid_search::SearchOrchestrator;
use metrics_exporter_prometheus::PrometheusBuilder;
use server::McpServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config);
    info!("Starting memvid-mcp v{}", memvid_common::VERSION);

    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([127, 0, 0, 1], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets(metrics::LATENCY_BUCKETS)?
            .install()?;
        info!(%addr, "Prometheus exporter listening");
    }

    let location = resolve_location(&config.memory)?;
    let store = SqliteStore::open(location.clone())
        .await?
        .with_embedder(create_embedder(&config.embedding)?)
        .with_min_similarity(config.search.min_similarity);
    let store: Arc<dyn MemoryStore> = Arc::new(store);

    let shutdown = CancellationToken::new();
    let provider = create_cancellable_provider(&config.llm, shutdown.clone())?;
    let rewriter = create_rewriter(&config, provider.as_ref())?;

    let orchestrator = SearchOrchestrator::new(store.clone()).with_rewriter(rewriter);
    let synthesizer = AnswerSynthesizer::new(provider)
        .with_persona(config.llm.system_prompt.clone())
        .with_model(config.llm.model.clone());

    let handlers = ToolHandlers::new(orchestrator, synthesizer, config.search.clone())
        .with_location(Some(location));
    let server = McpServer::new(handlers, config.request_timeout());

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    info!("Serving MCP on stdio");
    tokio::select! {
        result = server.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server loop failed");
            }
        }
        _ = shutdown.cancelled() => {}
    }

    if let Err(e) = store.seal().await {
        tracing::warn!(error = %e, "Failed to seal memory store");
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.with_ansi(false).init();
    }
}

/// Rewrite tier: the bridge's own endpoint for the host provider, otherwise
/// the configured provider; disabled without one.
fn create_rewriter(
    config: &AppConfig,
    provider: Option<&Arc<dyn LlmProvider>>,
) -> anyhow::Result<Option<Arc<dyn TermRewriter>>> {
    let Some(provider) = provider else {
        return Ok(None);
    };

    let rewriter: Arc<dyn TermRewriter> = if config.llm.provider == ProviderKind::Host {
        let base_url = config.llm.base_url.clone().unwrap_or_else(|| config.bridge_url());
        Arc::new(BridgeRewriter::new(
            &base_url,
            config.bridge.preferred_family.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )?)
    } else {
        Arc::new(QueryRewriter::new(provider.clone()).with_model(config.llm.model.clone()))
    };

    Ok(Some(rewriter))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
