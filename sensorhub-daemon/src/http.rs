// Sensorhub Daemon - Monitoring endpoints
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! HTTP endpoints for Prometheus and operators.
//!
//! - `/metrics`: Prometheus text format
//! - `/health`: 200 while the pipeline is operational, 503 otherwise
//! - `/status`: JSON summary of sensors, queue and dispatch counters

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use sensorhub::{DispatchMetrics, HealthStatus, QueueSnapshot, SensorHub, SensorType};
use serde::Serialize;

use crate::metrics::HubMetrics;
use crate::replay::DatasetInfo;

/// Application state shared across handlers.
pub struct AppState {
    pub hub: Arc<SensorHub>,
    pub metrics: HubMetrics,
    pub replay: Option<DatasetInfo>,
    pub start_time: Instant,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>Sensorhub</title></head>
<body>
    <h1>Sensorhub</h1>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
        <li><a href="/health">/health</a> - Health check</li>
        <li><a href="/status">/status</a> - Status information (JSON)</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.update(&state.hub);
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; charset=utf-8")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("Content-Type", "text/plain; charset=utf-8")],
            e.to_string(),
        ),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.hub.health();
    let code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy | HealthStatus::Unknown => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, state.hub.health_report())
}

#[derive(Serialize)]
struct SensorStatus {
    id: u32,
    sensor_type: SensorType,
    name: String,
    active: bool,
    requesters: usize,
    interval_ms: u32,
    batch_ms: u32,
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: &'static str,
    uptime_secs: u64,
    health: HealthStatus,
    clients: usize,
    display_off: bool,
    queue: QueueSnapshot,
    dispatch: DispatchMetrics,
    sensors: Vec<SensorStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    replay: Option<DatasetInfo>,
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let hub = &state.hub;
    let sensors = hub
        .registry()
        .nodes()
        .iter()
        .map(|node| SensorStatus {
            id: node.id(),
            sensor_type: node.sensor_type(),
            name: node.info().properties.name.clone(),
            active: node.is_active(),
            requesters: node.active_count(),
            interval_ms: node.effective_interval(),
            batch_ms: node.effective_batch(),
        })
        .collect();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        health: hub.health(),
        clients: hub.clients().len(),
        display_off: hub.dispatcher().is_display_off(),
        queue: hub.queue_snapshot(),
        dispatch: hub.metrics(),
        sensors,
        replay: state.replay.clone(),
    })
}
