//! Promsink HTTP API
//!
//! Two listeners, built with Axum:
//!
//! # Main listener (Prometheus-facing)
//! - `POST /write` - remote-write (snappy-compressed protobuf)
//! - `POST /read` - remote-read (snappy-compressed protobuf)
//!
//! # Admin listener
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! The admin surface is bound separately so cluster probes and the
//! ingestion path never share a port.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, ListenConfig};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Remote-write bodies decompress well past their wire size; cap the
/// compressed body, not the decoded one.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Build the Prometheus-facing router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/write", post(routes::write::remote_write))
        .route("/read", post(routes::read::remote_read))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the admin router (health probes)
pub fn build_admin_router(state: Arc<AppState>) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    Router::new()
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Prometheus-facing server. Returns after a shutdown signal
/// once the write pipeline has drained.
pub async fn serve(state: Arc<AppState>, config: &ListenConfig) -> Result<(), ApiError> {
    let pipeline = Arc::clone(&state.pipeline);
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Promsink API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    // No more writes can arrive; flush whatever the workers still hold.
    pipeline.close().await;

    tracing::info!("Promsink API shut down gracefully");
    Ok(())
}

/// Start the admin server. Runs until the process exits.
pub async fn serve_admin(state: Arc<AppState>, config: &ListenConfig) -> Result<(), ApiError> {
    let router = build_admin_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Promsink admin API listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => {
                tracing::error!("Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
