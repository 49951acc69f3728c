//! HTTP server for exposing Prometheus metrics
//!
//! Runs on a separate port (configurable via METRICS_PORT env var, default 9090).

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;

use crate::pool::ExtractorPool;

#[derive(Clone)]
struct AppState {
    start_time: Instant,
    pool: Option<Arc<ExtractorPool>>,
}

/// Start the metrics HTTP server
///
/// Endpoints:
/// - /metrics - Prometheus metrics in text format
/// - /health - Health check with uptime and, when given, extractor pool occupancy
pub async fn start_metrics_server(port: u16, pool: Option<Arc<ExtractorPool>>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(pool);

    log::info!("Starting metrics server on http://{}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(pool: Option<Arc<ExtractorPool>>) -> Router {
    let state = AppState {
        start_time: Instant::now(),
        pool,
    };
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        ),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut health_status = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "service": "mediarelay",
        "version": env!("CARGO_PKG_VERSION"),
    });
    if let Some(ref pool) = state.pool {
        health_status["pool"] = serde_json::json!(pool.stats());
    }

    (StatusCode::OK, axum::Json(health_status))
}
