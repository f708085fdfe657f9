//! HTTP server: shared context, router and lifecycle.

pub mod error;
pub mod extract;
pub mod request_id;
pub mod routes_api;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use mp3relay_core::Config;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::jobs::{self, JobRegistry};
use crate::upstream::{self, ConversionClient, RotatingExecutor};
use request_id::request_id_middleware;

/// Application context shared by all request handlers (via Axum state).
///
/// Cheaply cloneable: every field is an `Arc` or wraps one.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable configuration, resolved once at startup.
    pub config: Arc<Config>,
    /// Shared HTTP client (redirect-limited) used for file relays.
    pub http: reqwest::Client,
    /// Conversion API client over the rotating credential pool.
    pub upstream: ConversionClient,
    /// Resolved jobs awaiting status polls.
    pub jobs: JobRegistry,
}

impl AppContext {
    /// Build the context from a validated configuration.
    pub fn new(config: Config) -> mp3relay_core::Result<Self> {
        let http = upstream::build_http_client(&config.upstream)?;
        let executor = RotatingExecutor::from_config(http.clone(), &config.upstream)?;
        let upstream = ConversionClient::new(executor, &config.upstream);
        let jobs = JobRegistry::from_config(&config.jobs);

        Ok(Self {
            config: Arc::new(config),
            http,
            upstream,
            jobs,
        })
    }
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/start", post(routes_api::start))
        .route("/status", get(routes_api::status))
        .route("/stream", post(routes_api::stream));

    let static_dir = ctx.config.server.static_dir.clone();

    let mut app = Router::new()
        .route("/health", get(routes_api::health_check))
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Landing page and its assets.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            app = app.fallback_service(ServeDir::new(&dir).append_index_html_on_directories(true));
        }
    }

    app
}

/// Start the HTTP server and the job sweeper; returns after a shutdown
/// signal.
pub async fn start_server(config: Config) -> mp3relay_core::Result<()> {
    for warning in config.warnings() {
        tracing::warn!("Config warning: {warning}");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| mp3relay_core::Error::Config(format!("invalid server address: {e}")))?;

    tracing::info!(
        keys = config.upstream.api_keys.len(),
        api_host = %config.upstream.api_host,
        api_url = %config.upstream.api_url,
        contract = %config.upstream.contract,
        "Loaded upstream config"
    );

    let sweep_interval = Duration::from_secs(config.jobs.sweep_interval_secs.max(1));
    let ctx = AppContext::new(config)?;

    let cancel = CancellationToken::new();
    let sweeper = jobs::start_sweep_task(ctx.jobs.clone(), sweep_interval, cancel.clone());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server running on {addr}");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    let _ = sweeper.await;

    tracing::info!("Server shutdown complete");
    result.map_err(Into::into)
}

/// Wait for SIGINT/SIGTERM or for `cancel` to fire.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }

    tracing::info!("Shutdown signal received");
}
