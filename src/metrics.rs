//! Prometheus metrics for latency tracking and monitoring.
//!
//! This module provides metrics for:
//! - Venue request and poll latency
//! - Feed failures and circuit breaker trips
//! - Scan latency and opportunities found
//! - Execution attempts, outcomes and latency

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// Venue HTTP request latency metric name.
pub const METRIC_VENUE_REQUEST_LATENCY: &str = "venue_request_latency_ms";
/// Full venue poll latency metric name.
pub const METRIC_VENUE_POLL_LATENCY: &str = "venue_poll_latency_ms";
/// Scan latency metric name.
pub const METRIC_SCAN_LATENCY: &str = "scan_latency_ms";
/// Pipeline run latency metric name.
pub const METRIC_EXECUTION_LATENCY: &str = "execution_latency_ms";
/// Backend submission latency metric name.
pub const METRIC_SUBMIT_LATENCY: &str = "submit_latency_ms";
/// Venue polls counter metric name.
pub const METRIC_VENUE_POLLS: &str = "venue_polls_total";
/// Venue poll failures counter metric name.
pub const METRIC_VENUE_POLL_FAILURES: &str = "venue_poll_failures_total";
/// Circuit breaker trips counter metric name.
pub const METRIC_CIRCUIT_OPENS: &str = "venue_circuit_opens_total";
/// Opportunities detected counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Executions attempted counter metric name.
pub const METRIC_EXECUTIONS_ATTEMPTED: &str = "executions_attempted_total";
/// Executions succeeded counter metric name.
pub const METRIC_EXECUTIONS_SUCCEEDED: &str = "executions_succeeded_total";
/// Executions failed counter metric name.
pub const METRIC_EXECUTIONS_FAILED: &str = "executions_failed_total";
/// In-flight executions gauge metric name.
pub const METRIC_EXECUTIONS_IN_FLIGHT: &str = "executions_in_flight";

/// Install the Prometheus recorder and return a handle for rendering.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(
        METRIC_VENUE_REQUEST_LATENCY,
        "Venue HTTP request latency in milliseconds"
    );
    describe_histogram!(
        METRIC_VENUE_POLL_LATENCY,
        "Venue price poll latency in milliseconds"
    );
    describe_histogram!(
        METRIC_SCAN_LATENCY,
        "Opportunity scan latency in milliseconds"
    );
    describe_histogram!(
        METRIC_EXECUTION_LATENCY,
        "Execution pipeline run latency in milliseconds"
    );
    describe_histogram!(
        METRIC_SUBMIT_LATENCY,
        "Execution backend submission latency in milliseconds"
    );

    // Counters
    describe_counter!(METRIC_VENUE_POLLS, "Total number of venue price polls");
    describe_counter!(
        METRIC_VENUE_POLL_FAILURES,
        "Total number of failed venue price polls"
    );
    describe_counter!(
        METRIC_CIRCUIT_OPENS,
        "Total number of venue circuit breaker trips"
    );
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Total number of arbitrage opportunities detected"
    );
    describe_counter!(
        METRIC_EXECUTIONS_ATTEMPTED,
        "Total number of execution pipeline runs"
    );
    describe_counter!(
        METRIC_EXECUTIONS_SUCCEEDED,
        "Total number of successful executions"
    );
    describe_counter!(
        METRIC_EXECUTIONS_FAILED,
        "Total number of failed executions"
    );

    describe_gauge!(
        METRIC_EXECUTIONS_IN_FLIGHT,
        "Execution pipeline runs currently in flight"
    );

    debug!("Metrics initialized");
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Record venue HTTP request latency.
pub fn record_venue_request_latency(start: Instant, venue: &str) {
    histogram!(METRIC_VENUE_REQUEST_LATENCY, "venue" => venue.to_string()).record(elapsed_ms(start));
}

/// Record a venue poll latency in milliseconds.
pub fn record_venue_poll_latency(latency_ms: f64, venue: &str) {
    histogram!(METRIC_VENUE_POLL_LATENCY, "venue" => venue.to_string()).record(latency_ms);
}

/// Record backend submission latency.
pub fn record_submit_latency(start: Instant) {
    histogram!(METRIC_SUBMIT_LATENCY).record(elapsed_ms(start));
}

/// Record a pipeline run latency in milliseconds.
pub fn record_execution_latency(latency_ms: f64) {
    histogram!(METRIC_EXECUTION_LATENCY).record(latency_ms);
}

/// Increment venue polls counter.
pub fn inc_venue_polls(venue: &str) {
    counter!(METRIC_VENUE_POLLS, "venue" => venue.to_string()).increment(1);
}

/// Increment venue poll failures counter.
pub fn inc_venue_poll_failures(venue: &str) {
    counter!(METRIC_VENUE_POLL_FAILURES, "venue" => venue.to_string()).increment(1);
}

/// Increment circuit breaker trips counter.
pub fn inc_circuit_opens(venue: &str) {
    counter!(METRIC_CIRCUIT_OPENS, "venue" => venue.to_string()).increment(1);
}

/// Add to the opportunities detected counter.
pub fn add_opportunities_detected(count: u64) {
    counter!(METRIC_OPPORTUNITIES_DETECTED).increment(count);
}

/// Increment executions attempted counter.
pub fn inc_executions_attempted() {
    counter!(METRIC_EXECUTIONS_ATTEMPTED).increment(1);
}

/// Increment executions succeeded counter.
pub fn inc_executions_succeeded() {
    counter!(METRIC_EXECUTIONS_SUCCEEDED).increment(1);
}

/// Increment executions failed counter.
pub fn inc_executions_failed() {
    counter!(METRIC_EXECUTIONS_FAILED).increment(1);
}

/// Set the in-flight executions gauge.
pub fn set_executions_in_flight(count: usize) {
    gauge!(METRIC_EXECUTIONS_IN_FLIGHT).set(count as f64);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        elapsed_ms(self.start)
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(elapsed_ms(self.start));
    }
}

/// Create a latency timer for one scan.
pub fn timer_scan() -> LatencyTimer {
    LatencyTimer::new(METRIC_SCAN_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = timer_scan();
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn helpers_work_without_recorder() {
        inc_venue_polls("jupiter");
        add_opportunities_detected(3);
        set_executions_in_flight(2);
        record_venue_poll_latency(1.5, "jupiter");
    }
}
