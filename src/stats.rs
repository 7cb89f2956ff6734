//! Counters and latencies for feeds and executions.
//!
//! All mutation goes through one lock owned by [`StatsAggregator`];
//! readers get an owned [`StatsSnapshot`].

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;

use crate::metrics;
use crate::venue::VenueId;

/// Execution counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    /// Opportunities produced by the scanner.
    pub opportunities_found: u64,
    /// Pipeline runs started.
    pub attempts: u64,
    /// Runs that settled.
    pub successes: u64,
    /// Runs that failed at any step.
    pub failures: u64,
    /// Sum of settlement costs reported by the backend.
    pub total_settlement_cost: Decimal,
    /// Sum of realized profit.
    pub total_realized_profit: Decimal,
    /// Largest single realized profit.
    pub largest_profit: Decimal,
    /// Running average latency of successful runs.
    pub average_latency_ms: f64,
}

impl ExecutionStats {
    /// Fraction of attempts that succeeded, 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// Per-venue feed counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VenueFeedStats {
    /// Polls started.
    pub polls: u64,
    /// Polls that stored prices.
    pub successes: u64,
    /// Polls that failed.
    pub failures: u64,
    /// Circuit breaker trips.
    pub circuit_opens: u64,
    /// Running average latency of successful polls.
    pub average_poll_latency_ms: f64,
    /// Time of the last successful poll.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success: Option<OffsetDateTime>,
}

/// Read-only view of all counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Execution counters.
    pub execution: ExecutionStats,
    /// Successes over attempts.
    pub success_rate: f64,
    /// Feed counters keyed by venue.
    pub venues: BTreeMap<VenueId, VenueFeedStats>,
}

#[derive(Debug, Default)]
struct StatsInner {
    execution: ExecutionStats,
    venues: BTreeMap<VenueId, VenueFeedStats>,
}

/// Incremental mean after adding the `n`th sample.
fn running_average(old: f64, n: u64, sample: f64) -> f64 {
    if n == 0 {
        return old;
    }
    (old * (n - 1) as f64 + sample) / n as f64
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Single owner of engine statistics.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<StatsInner>,
}

impl StatsAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut StatsInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut inner)
    }

    /// Count opportunities from one scan.
    pub fn record_opportunities(&self, count: usize) {
        self.with(|s| s.execution.opportunities_found += count as u64);
        metrics::add_opportunities_detected(count as u64);
    }

    /// Count a pipeline run starting.
    pub fn record_attempt(&self) {
        self.with(|s| s.execution.attempts += 1);
        metrics::inc_executions_attempted();
    }

    /// Record a settled run.
    pub fn record_success(&self, realized_profit: Decimal, settlement_cost: Decimal, latency: Duration) {
        self.with(|s| {
            let e = &mut s.execution;
            e.successes += 1;
            e.total_realized_profit += realized_profit;
            e.total_settlement_cost += settlement_cost;
            if realized_profit > e.largest_profit {
                e.largest_profit = realized_profit;
            }
            e.average_latency_ms = running_average(e.average_latency_ms, e.successes, millis(latency));
        });
        metrics::inc_executions_succeeded();
        metrics::record_execution_latency(millis(latency));
    }

    /// Record a failed run.
    pub fn record_failure(&self, latency: Duration) {
        self.with(|s| s.execution.failures += 1);
        metrics::inc_executions_failed();
        metrics::record_execution_latency(millis(latency));
    }

    /// Register a venue so it shows up before its first poll.
    pub fn register_venue(&self, venue: &VenueId) {
        self.with(|s| {
            s.venues.entry(venue.clone()).or_default();
        });
    }

    /// Record a poll that stored prices.
    pub fn record_feed_success(&self, venue: &VenueId, latency: Duration) {
        self.with(|s| {
            let v = s.venues.entry(venue.clone()).or_default();
            v.polls += 1;
            v.successes += 1;
            v.average_poll_latency_ms = running_average(v.average_poll_latency_ms, v.successes, millis(latency));
            v.last_success = Some(OffsetDateTime::now_utc());
        });
        metrics::inc_venue_polls(venue.as_str());
        metrics::record_venue_poll_latency(millis(latency), venue.as_str());
    }

    /// Record a failed poll.
    pub fn record_feed_failure(&self, venue: &VenueId) {
        self.with(|s| {
            let v = s.venues.entry(venue.clone()).or_default();
            v.polls += 1;
            v.failures += 1;
        });
        metrics::inc_venue_polls(venue.as_str());
        metrics::inc_venue_poll_failures(venue.as_str());
    }

    /// Record a circuit breaker trip.
    pub fn record_circuit_open(&self, venue: &VenueId) {
        self.with(|s| s.venues.entry(venue.clone()).or_default().circuit_opens += 1);
        metrics::inc_circuit_opens(venue.as_str());
    }

    /// Copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.with(|s| StatsSnapshot {
            success_rate: s.execution.success_rate(),
            execution: s.execution.clone(),
            venues: s.venues.clone(),
        })
    }

    /// Copy of one venue's counters.
    pub fn venue(&self, venue: &VenueId) -> Option<VenueFeedStats> {
        self.with(|s| s.venues.get(venue).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn running_average_is_incremental() {
        let stats = StatsAggregator::new();
        stats.record_success(dec!(1), dec!(0.1), Duration::from_millis(100));
        stats.record_success(dec!(3), dec!(0.1), Duration::from_millis(200));
        stats.record_success(dec!(2), dec!(0.1), Duration::from_millis(300));

        let snap = stats.snapshot();
        assert!((snap.execution.average_latency_ms - 200.0).abs() < 1e-9);
        assert_eq!(snap.execution.total_realized_profit, dec!(6));
        assert_eq!(snap.execution.total_settlement_cost, dec!(0.3));
        assert_eq!(snap.execution.largest_profit, dec!(3));
    }

    #[test]
    fn failures_do_not_move_the_average() {
        let stats = StatsAggregator::new();
        stats.record_attempt();
        stats.record_success(dec!(1), Decimal::ZERO, Duration::from_millis(50));
        stats.record_attempt();
        stats.record_failure(Duration::from_secs(30));

        let snap = stats.snapshot();
        assert!((snap.execution.average_latency_ms - 50.0).abs() < 1e-9);
        assert_eq!(snap.execution.failures, 1);
        assert!((snap.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn success_rate_is_zero_without_attempts() {
        assert_eq!(StatsAggregator::new().snapshot().success_rate, 0.0);
    }

    #[test]
    fn feed_counters_per_venue() {
        let stats = StatsAggregator::new();
        let v1 = VenueId::new("v1");
        let v2 = VenueId::new("v2");
        stats.register_venue(&v2);
        stats.record_feed_success(&v1, Duration::from_millis(10));
        stats.record_feed_failure(&v1);
        stats.record_circuit_open(&v1);

        let v1_stats = stats.venue(&v1).unwrap();
        assert_eq!(v1_stats.polls, 2);
        assert_eq!(v1_stats.successes, 1);
        assert_eq!(v1_stats.failures, 1);
        assert_eq!(v1_stats.circuit_opens, 1);
        assert!(v1_stats.last_success.is_some());
        assert_eq!(stats.venue(&v2).unwrap().polls, 0);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = Arc::new(StatsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        stats.record_attempt();
                        stats.record_success(dec!(1), Decimal::ZERO, Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.execution.attempts, 8_000);
        assert_eq!(snap.execution.successes, 8_000);
        assert_eq!(snap.execution.total_realized_profit, dec!(8000));
    }
}
