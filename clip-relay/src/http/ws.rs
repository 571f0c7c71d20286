//! WebSocket upgrade endpoint.

use crate::error::RelayError;
use crate::server::ClipRelay;
use crate::session::Session;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use std::sync::Arc;

/// `GET /ws`: upgrade and hand the socket to a [`Session`].
///
/// Answers 503 once shutdown has begun.
pub async fn ws_handler(
    Extension(relay): Extension<Arc<ClipRelay>>,
    ws: WebSocketUpgrade,
) -> Response {
    if relay.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    ws.on_upgrade(move |socket| async move {
        match Session::new(relay, socket).run().await {
            Ok(()) => {}
            Err(RelayError::Protocol(e)) => tracing::debug!(error = %e, "Session rejected"),
            Err(e) => tracing::warn!(error = %e, "Session rejected"),
        }
    })
}
