//! Geotech Q&A API Gateway
//!
//! The HTTP entry point for questions.
//! Handles:
//! - Request validation and routing
//! - Rate limiting
//! - Request ids threaded through the pipeline as trace ids
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use geoqa_common::{
    config::{AppConfig, ObservabilityConfig},
    embeddings::create_embedder,
    llm::{create_language_model, CompletionOptions},
    metrics::{self, MetricsRegistry, METRICS_PREFIX, STAGE_BUCKETS},
    VERSION,
};
use geoqa_ingestion::load_or_build_index;
use geoqa_pipeline::{LlmSynthesizer, Orchestrator};
use geoqa_search::VectorRetriever;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use middleware::rate_limit::{rate_limit_middleware, RateLimit};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<MetricsRegistry>,
    /// Chunks in the loaded vector index
    pub indexed_chunks: usize,
    pub llm_configured: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config.observability);
    info!("Starting Geotech Q&A Gateway v{}", VERSION);
    info!(config = ?config.redacted(), "Configuration loaded");

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        match prometheus_builder(addr).and_then(PrometheusBuilder::install) {
            Ok(()) => info!(%addr, "Prometheus exporter listening"),
            Err(e) => warn!(error = %e, "Prometheus exporter disabled"),
        }
    }

    // Knowledge index
    let embedder = create_embedder(&config.embedding)?;
    let index = load_or_build_index(&config.retrieval, embedder.as_ref())
        .await
        .context("failed to load or build the vector index")?;
    let indexed_chunks = index.len();
    info!(chunks = indexed_chunks, model = index.model(), "Vector index loaded");
    let retriever = Arc::new(VectorRetriever::new(embedder, Arc::new(index)));

    // Synthesis
    let model = create_language_model(&config.llm)?;
    let llm_configured = model.is_configured();
    info!(model = model.name(), configured = llm_configured, "Language model ready");
    let synthesizer = Arc::new(LlmSynthesizer::new(
        model,
        CompletionOptions::from_config(&config.llm),
    ));

    let metrics = Arc::new(MetricsRegistry::new());
    let orchestrator = Orchestrator::new(retriever, synthesizer, metrics.clone(), &config)?;

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        orchestrator: Arc::new(orchestrator),
        metrics,
        indexed_chunks,
        llm_configured,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Prometheus exporter with explicit buckets for stage latency histograms
fn prometheus_builder(addr: SocketAddr) -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).set_buckets_for_metric(
        Matcher::Full(format!("{}_stage_duration_seconds", METRICS_PREFIX)),
        STAGE_BUCKETS,
    )
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let rate_limit = RateLimit::from_config(&state.config.rate_limit);

    let mut api_routes = Router::new().route("/ask", post(handlers::ask::ask));
    if let Some(rate_limit) = rate_limit {
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ));
    }

    Router::new()
        .merge(api_routes)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::metrics::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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


#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_prometheus_builder_accepts_stage_buckets() {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        assert_ok!(prometheus_builder(addr));
    }
}
