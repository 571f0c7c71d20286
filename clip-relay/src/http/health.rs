//! Health check endpoints.

use crate::server::ClipRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Number of registered connections.
    pub connections: usize,
    /// Number of users with at least one connection.
    pub users: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// `GET /health`: liveness.
pub async fn health_handler(Extension(relay): Extension<Arc<ClipRelay>>) -> Json<HealthStatus> {
    let status = if relay.is_shutting_down() { "shutting_down" } else { "ok" };
    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: relay.registry().len(),
        users: relay.registry().user_count(),
        uptime_seconds: relay.uptime().as_secs(),
    })
}

/// `GET /healthz`: the metrics snapshot as a flat JSON object.
pub async fn healthz_handler(
    Extension(relay): Extension<Arc<ClipRelay>>,
) -> Json<BTreeMap<String, i64>> {
    Json(relay.metrics().snapshot())
}
