//! HTTP endpoints for clipsync-relay.
//!
//! Provides the WebSocket endpoint, health checks, metrics, and the blob
//! upload/download pair.

pub mod health;
mod metrics;
pub mod uploads;
mod ws;

use crate::server::ClipRelay;
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Router};
use rand::RngCore;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

pub use health::HealthStatus;
pub use uploads::UploadResponse;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<ClipRelay>) -> Router {
    let max_upload = relay.config().uploads.max_bytes;
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::healthz_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .route(
            "/upload",
            post(uploads::upload_handler).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/d/:id", get(uploads::download_handler))
        .layer(middleware::from_fn(log_requests))
        .layer(Extension(relay))
}

/// Serve the router on `listener` until `signal` resolves.
///
/// When the signal fires the relay's sessions are closed first, then the
/// HTTP server drains.
pub async fn serve<F>(listener: TcpListener, relay: Arc<ClipRelay>, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(relay.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            relay.shutdown().await;
        })
        .await
}

/// Emit one `http_request` event per request.
async fn log_requests(request: Request, next: Next) -> Response {
    let request_id = request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        dur_ms = started.elapsed().as_millis() as u64,
        "http_request"
    );
    response
}

fn request_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
