//! Prometheus metrics endpoint.

use crate::metrics::{CLIPS_TOTAL, CONNS_CURRENT, DROPS_DEVICE_PREFIX, DROPS_TOTAL};
use crate::server::ClipRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Renders the same snapshot as `/healthz` in Prometheus text format.
pub async fn metrics_handler(Extension(relay): Extension<Arc<ClipRelay>>) -> impl IntoResponse {
    let snapshot = relay.metrics().snapshot();
    let body = render(&snapshot, relay.registry().user_count(), relay.rate_limits().tracked_devices());
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

fn render(snapshot: &BTreeMap<String, i64>, users: usize, buckets: usize) -> String {
    let get = |key: &str| snapshot.get(key).copied().unwrap_or(0);

    let mut body = format!(
        r#"# HELP clipsync_relay_connections_active Number of registered connections
# TYPE clipsync_relay_connections_active gauge
clipsync_relay_connections_active {conns}

# HELP clipsync_relay_users_active Number of users with a registered connection
# TYPE clipsync_relay_users_active gauge
clipsync_relay_users_active {users}

# HELP clipsync_relay_rate_buckets Number of per-device rate limit buckets
# TYPE clipsync_relay_rate_buckets gauge
clipsync_relay_rate_buckets {buckets}

# HELP clipsync_relay_info Server information
# TYPE clipsync_relay_info gauge
clipsync_relay_info{{version="{version}"}} 1

# HELP clipsync_relay_clips_total Clips delivered to every target
# TYPE clipsync_relay_clips_total counter
clipsync_relay_clips_total {clips}

# HELP clipsync_relay_drops_total Rejected, duplicate, rate-limited and backpressure-failed clips
# TYPE clipsync_relay_drops_total counter
clipsync_relay_drops_total {drops}

# HELP clipsync_relay_device_drops_total Failed writes per target device
# TYPE clipsync_relay_device_drops_total counter
"#,
        conns = get(CONNS_CURRENT),
        clips = get(CLIPS_TOTAL),
        drops = get(DROPS_TOTAL),
        version = env!("CARGO_PKG_VERSION"),
    );

    for (key, count) in snapshot {
        let Some(pair) = key.strip_prefix(DROPS_DEVICE_PREFIX) else {
            continue;
        };
        // Device ids never contain '|', user ids might
        let Some((user, device)) = pair.rsplit_once('|') else {
            continue;
        };
        let _ = writeln!(
            body,
            "clipsync_relay_device_drops_total{{user=\"{}\",device=\"{}\"}} {}",
            escape_label(user),
            escape_label(device),
            count
        );
    }
    body
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
