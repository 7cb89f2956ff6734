//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::prices::VenueHealth;
use crate::stats::StatsAggregator;
use crate::venue::VenueId;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether feeds and the scan loop are running.
    pub ready: Arc<AtomicBool>,
    /// Whether orders are settled by the simulated backend.
    pub dry_run: bool,
    /// Engine statistics.
    pub stats: Arc<StatsAggregator>,
    /// Per-venue feed health.
    pub health: Arc<DashMap<VenueId, VenueHealth>>,
    /// Configured venues, in order.
    pub venues: Arc<Vec<VenueId>>,
    /// Prometheus renderer, when the exporter is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(
        stats: Arc<StatsAggregator>,
        health: Arc<DashMap<VenueId, VenueHealth>>,
        venues: Vec<VenueId>,
    ) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            dry_run: true,
            stats,
            health,
            venues: Arc::new(venues),
            metrics: None,
        }
    }

    /// Attach the Prometheus renderer.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Record the execution mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            Arc::new(StatsAggregator::new()),
            Arc::new(DashMap::new()),
            Vec::new(),
        )
    }
}

fn rfc3339(t: Option<OffsetDateTime>) -> Option<String> {
    t.and_then(|t| t.format(&Rfc3339).ok())
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
    /// Venues currently delivering prices.
    pub active_venues: usize,
}

/// Status response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// Service status.
    pub status: String,
    /// "dry_run" or "live".
    pub mode: String,
    /// Execution statistics.
    pub stats: StatsResponse,
}

/// Statistics in status response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Opportunities found.
    pub opportunities_found: u64,
    /// Executions attempted.
    pub attempts: u64,
    /// Executions settled.
    pub successes: u64,
    /// Executions failed.
    pub failures: u64,
    /// Successes over attempts.
    pub success_rate: f64,
    /// Total realized profit.
    pub total_realized_profit: String,
    /// Total settlement cost.
    pub total_settlement_cost: String,
    /// Largest single profit.
    pub largest_profit: String,
    /// Average latency of settled executions.
    pub average_latency_ms: f64,
}

/// One venue in the venues response.
#[derive(Debug, Serialize, ToSchema)]
pub struct VenueStatus {
    /// Venue id.
    pub venue: String,
    /// Feed loop state.
    pub state: String,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// When a suspended venue resumes.
    pub circuit_open_until: Option<String>,
    /// Most recent failure.
    pub last_error: Option<String>,
    /// Polls started.
    pub polls: u64,
    /// Polls that failed.
    pub failures: u64,
    /// Circuit breaker trips.
    pub circuit_opens: u64,
    /// Average latency of successful polls.
    pub average_poll_latency_ms: f64,
    /// Last successful poll.
    pub last_success: Option<String>,
}

/// Health check handler - always returns 200.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "Process is alive", body = HealthResponse)))]
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Engine running", body = ReadyResponse),
        (status = 503, body = ReadyResponse, description = "Engine not running")
    )
)]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let active_venues = state
        .stats
        .snapshot()
        .venues
        .values()
        .filter(|v| v.successes > 0)
        .count();

    let response = ReadyResponse {
        ready: is_ready,
        active_venues,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns engine status and statistics.
#[utoipa::path(get, path = "/api/v1/status", responses((status = 200, description = "Execution statistics", body = StatusResponse)))]
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.stats.snapshot();
    let exec = snapshot.execution;

    let status = if state.is_ready() { "running" } else { "starting" };
    let mode = if state.dry_run { "dry_run" } else { "live" };

    Json(StatusResponse {
        status: status.to_string(),
        mode: mode.to_string(),
        stats: StatsResponse {
            opportunities_found: exec.opportunities_found,
            attempts: exec.attempts,
            successes: exec.successes,
            failures: exec.failures,
            success_rate: snapshot.success_rate,
            total_realized_profit: exec.total_realized_profit.to_string(),
            total_settlement_cost: exec.total_settlement_cost.to_string(),
            largest_profit: exec.largest_profit.to_string(),
            average_latency_ms: exec.average_latency_ms,
        },
    })
}

/// Venues handler - feed health and counters per venue, in configured order.
#[utoipa::path(get, path = "/api/v1/venues", responses((status = 200, description = "Feed health per venue", body = Vec<VenueStatus>)))]
pub async fn venues(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.stats.snapshot();

    let venues: Vec<VenueStatus> = state
        .venues
        .iter()
        .map(|venue| {
            let health = state.health.get(venue).map(|h| h.clone()).unwrap_or_default();
            let feed = snapshot.venues.get(venue).cloned().unwrap_or_default();
            VenueStatus {
                venue: venue.to_string(),
                state: health.state.to_string(),
                consecutive_failures: health.consecutive_failures,
                circuit_open_until: rfc3339(health.circuit_open_until),
                last_error: health.last_error,
                polls: feed.polls,
                failures: feed.failures,
                circuit_opens: feed.circuit_opens,
                average_poll_latency_ms: feed.average_poll_latency_ms,
                last_success: rfc3339(feed.last_success),
            }
        })
        .collect();

    Json(venues)
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics exporter not installed\n".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_ready_toggle() {
        let state = AppState::default();
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        assert_eq!(rfc3339(None), None);
        let t = OffsetDateTime::UNIX_EPOCH;
        assert_eq!(rfc3339(Some(t)).as_deref(), Some("1970-01-01T00:00:00Z"));
    }
}
