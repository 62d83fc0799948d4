//! Pressroom API Gateway
//!
//! The entry point for all edition traffic.
//! Handles:
//! - Multipart uploads into the storage directory
//! - Edition routing (create, query, update, delete)
//! - Static serving of stored files under `/uploads`
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;
mod upload;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use pressroom_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    edition::{Cleanup, EditionService, EditionStore, MemoryEditionStore},
    metrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<EditionService>,
    /// Absent when editions are kept in memory
    pub db: Option<DbPool>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load().context("Failed to load configuration")?);

    init_tracing(&config);
    info!("Starting Pressroom API Gateway v{}", pressroom_common::VERSION);

    // Initialize metrics
    init_metrics(&config)?;
    metrics::register_metrics();

    // Storage directory
    let uploads = config.uploads_dir();
    tokio::fs::create_dir_all(&uploads)
        .await
        .with_context(|| format!("Failed to create {}", uploads.display()))?;

    // Edition store
    let (store, db): (Arc<dyn EditionStore>, Option<DbPool>) = if config.database.is_memory() {
        warn!("Using in-memory edition store; editions are lost on restart");
        (Arc::new(MemoryEditionStore::new()), None)
    } else {
        let pool = DbPool::shared(&config.database).await?.clone();
        let repo = Repository::new(pool.clone());
        repo.ensure_schema().await?;
        (Arc::new(repo), Some(pool))
    };

    let (cleanup, cleanup_worker) = Cleanup::from_config(&config.storage.base_dir, &config.cleanup);
    info!(mode = ?config.cleanup.mode, "Cleanup configured");

    // Create app state
    let state = AppState {
        config: config.clone(),
        service: Arc::new(EditionService::new(store, cleanup)),
        db,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server host/port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and with it every queue handle) is gone; let the worker drain.
    if let Some(worker) = cleanup_worker {
        match tokio::time::timeout(config.shutdown_timeout(), worker).await {
            Ok(_) => info!("Cleanup worker drained"),
            Err(_) => warn!("Cleanup worker still busy at shutdown; pending removals dropped"),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &AppConfig) -> anyhow::Result<()> {
    let port = config.observability.metrics_port;
    if port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::LATENCY_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let server = &state.config.server;

    // CORS configuration
    let origins: Vec<HeaderValue> = server
        .cors_allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(if origins.is_empty() {
            AllowOrigin::from(Any)
        } else {
            AllowOrigin::list(origins)
        })
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Edition endpoints
    let upload_routes = Router::new()
        .route("/new", post(handlers::editions::create_edition))
        .route("/data", get(handlers::editions::fetch_editions))
        .route("/all", get(handlers::editions::list_editions))
        .route(
            "/{id}",
            get(handlers::editions::get_edition)
                .put(handlers::editions::update_edition)
                .delete(handlers::editions::delete_edition),
        )
        .layer(DefaultBodyLimit::max(server.max_upload_bytes));

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api/upload", upload_routes)
        .nest_service("/uploads", ServeDir::new(state.config.uploads_dir()))
        .layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .layer(
            ServiceBuilder::new()
                .layer(request_id)
                .layer(TraceLayer::new_for_http())
                .layer(propagate_id)
                .layer(cors)
                .layer(TimeoutLayer::new(state.config.request_timeout())),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
