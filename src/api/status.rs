//! Status Routes
//!
//! Health checks, status endpoints, and metrics.
//!
//! Routes:
//! - GET /health - Basic health check
//! - GET /health/ready - Readiness check (storage root reachable)
//! - GET /health/live - Liveness check (server responding)
//! - GET /status - Export counters and uptime
//! - GET /metrics - Prometheus metrics endpoint

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::ExportStatsSnapshot;
use crate::AppState;

static STARTUP_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize startup time. Call this once at server start.
pub fn init_startup_time() {
    let _ = STARTUP_TIME.get_or_init(Instant::now);
}

/// Get uptime in seconds since server start.
fn get_uptime_seconds() -> u64 {
    STARTUP_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/health/live", get(liveness_check))
        .route("/status", get(system_status))
        .route("/metrics", get(prometheus_metrics))
}

// ============================================================================
// Response Types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: Vec<DependencyCheck>,
}

#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub message: Option<String>,
}

/// System status response.
#[derive(Debug, Serialize)]
pub struct SystemStatusResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub storage: DependencyCheck,
    pub exports: ExportStatsSnapshot,
}

// ============================================================================
// Handlers
// ============================================================================

/// Basic health check.
///
/// GET /health
#[axum::debug_handler]
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: Utc::now(),
    })
}

/// Readiness check.
///
/// GET /health/ready
///
/// Returns 503 while the storage root cannot be read.
#[axum::debug_handler]
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage = check_storage(&state).await;
    let ready = storage.status == HealthStatus::Healthy;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            checks: vec![storage],
        }),
    )
}

/// Liveness check.
///
/// GET /health/live
#[axum::debug_handler]
async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Export counters and uptime.
///
/// GET /status
#[axum::debug_handler]
async fn system_status(State(state): State<AppState>) -> Json<SystemStatusResponse> {
    let storage = check_storage(&state).await;

    Json(SystemStatusResponse {
        status: storage.status,
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: get_uptime_seconds(),
        storage,
        exports: state.exports.stats(),
    })
}

/// Prometheus metrics endpoint.
///
/// GET /metrics
#[axum::debug_handler]
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
        render_metrics(&state.exports.stats(), get_uptime_seconds()),
    )
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Check that the storage root is reachable.
async fn check_storage(state: &AppState) -> DependencyCheck {
    let start = Instant::now();
    let result = state.storage.health_check().await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let (status, message) = match result {
        Ok(()) => (HealthStatus::Healthy, None),
        Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
    };

    DependencyCheck {
        name: format!("storage:{}", state.storage.kind()),
        status,
        latency_ms: Some(latency_ms),
        message,
    }
}

fn render_metrics(stats: &ExportStatsSnapshot, uptime_seconds: u64) -> String {
    format!(
        r#"# HELP modelkit_exports_started_total Exports that began streaming
# TYPE modelkit_exports_started_total counter
modelkit_exports_started_total {}

# HELP modelkit_exports_completed_total Exports that finished with a complete archive
# TYPE modelkit_exports_completed_total counter
modelkit_exports_completed_total {}

# HELP modelkit_exports_failed_total Exports that failed before or during streaming
# TYPE modelkit_exports_failed_total counter
modelkit_exports_failed_total {}

# HELP modelkit_exports_aborted_total Exports abandoned because the client disconnected
# TYPE modelkit_exports_aborted_total counter
modelkit_exports_aborted_total {}

# HELP modelkit_export_bytes_total Archive bytes handed to clients
# TYPE modelkit_export_bytes_total counter
modelkit_export_bytes_total {}

# HELP modelkit_uptime_seconds Seconds since the server started
# TYPE modelkit_uptime_seconds gauge
modelkit_uptime_seconds {}

# HELP modelkit_up Whether the service is up
# TYPE modelkit_up gauge
modelkit_up 1
"#,
        stats.started,
        stats.completed,
        stats.failed,
        stats.aborted,
        stats.bytes_sent,
        uptime_seconds
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metrics() {
        let stats = ExportStatsSnapshot {
            started: 3,
            completed: 2,
            failed: 1,
            aborted: 0,
            bytes_sent: 4096,
        };
        let text = render_metrics(&stats, 42);

        assert!(text.contains("modelkit_exports_started_total 3\n"));
        assert!(text.contains("modelkit_exports_completed_total 2\n"));
        assert!(text.contains("modelkit_exports_failed_total 1\n"));
        assert!(text.contains("modelkit_exports_aborted_total 0\n"));
        assert!(text.contains("modelkit_export_bytes_total 4096\n"));
        assert!(text.contains("modelkit_uptime_seconds 42\n"));
    }
}
