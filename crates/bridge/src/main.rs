//! memvid-bridge
//!
//! Loopback HTTP service that exposes the host's language models to the
//! memory server:
//! - `/llm/generate` with model-family routing and fallback
//! - `/llm/rewrite` for the search rewrite tier
//! - `/health` and Prometheus `/metrics`

mod routes;

use memvid_common::{config::AppConfig, metrics, providers::HostModelCatalog};
use metrics_exporter_prometheus::PrometheusBuilder;
use routes::AppState;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }

    info!("Starting memvid-bridge v{}", memvid_common::VERSION);

    let addr = routes::bind_address(&config.bridge.host, config.bridge.port)?;

    metrics::register_metrics();
    let handle = PrometheusBuilder::new()
        .set_buckets(metrics::PROVIDER_BUCKETS)?
        .install_recorder()?;

    let catalog = HostModelCatalog::from_config(&config.bridge, &config.llm)?;
    if catalog.is_empty() {
        tracing::warn!("No host models configured; every generation will fail");
    } else {
        info!(families = ?catalog.families(), "Host model catalog loaded");
    }

    let state = AppState {
        catalog: Arc::new(catalog),
        metrics: Some(handle),
    };
    let app = routes::create_router(state, config.request_timeout());

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Bridge shutdown complete");
    Ok(())
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
