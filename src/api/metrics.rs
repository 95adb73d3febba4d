//! Prometheus metrics: the `/metrics` endpoint, request tracking middleware
//! and recorders for ride and realtime events.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::db::RideStatus;
use crate::realtime::{BroadcastReport, PeerRole};
use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const RIDE_TRANSITIONS_TOTAL: &str = "ride_transitions_total";
pub const REALTIME_MESSAGES_TOTAL: &str = "realtime_messages_total";
pub const REALTIME_CONNECTIONS: &str = "realtime_connections";
pub const PENDING_RIDES: &str = "pending_rides";

/// Install the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(
        RIDE_TRANSITIONS_TOTAL,
        "Rides entering each status (pending = requested)"
    );
    describe_counter!(
        REALTIME_MESSAGES_TOTAL,
        "Realtime messages by event, peer role and outcome (delivered/dropped)"
    );
    describe_gauge!(REALTIME_CONNECTIONS, "Open websocket connections per role");
    describe_gauge!(PENDING_RIDES, "Rides waiting for a driver");

    Ok(handle)
}

/// GET /metrics, unauthenticated
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM rides WHERE status = 'pending'")
            .fetch_one(&state.db)
            .await
    {
        gauge!(PENDING_RIDES).set(count as f64);
    }

    for role in [PeerRole::Driver, PeerRole::Rider] {
        gauge!(REALTIME_CONNECTIONS, "role" => role.as_str()).set(state.registry.len(role) as f64);
    }
}

/// Count every request by method, matched route and status, and time it
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Matched route template keeps label cardinality bounded (`/rides/:id`)
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_ride_transition(status: RideStatus) {
    counter!(RIDE_TRANSITIONS_TOTAL, "status" => status.as_str()).increment(1);
}

pub fn record_broadcast(event: &'static str, role: PeerRole, report: BroadcastReport) {
    if report.delivered > 0 {
        counter!(REALTIME_MESSAGES_TOTAL, "event" => event, "role" => role.as_str(), "outcome" => "delivered")
            .increment(report.delivered as u64);
    }
    if report.dropped > 0 {
        counter!(REALTIME_MESSAGES_TOTAL, "event" => event, "role" => role.as_str(), "outcome" => "dropped")
            .increment(report.dropped as u64);
    }
}
