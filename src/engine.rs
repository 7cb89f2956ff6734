//! Top-level wiring of feeds, scanner and executor.
//!
//! This module handles:
//! - Starting and stopping per-venue feeds
//! - The scan and dispatch cycle
//! - Periodic performance reporting

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use crate::arbitrage::{
    scan, ExecutionCoordinator, ExecutionPipeline, ExecutionResult, PipelineSettings, ScanParams,
};
use crate::config::Config;
use crate::error::VenueError;
use crate::events::{EngineEvent, EventBus};
use crate::metrics;
use crate::prices::{FeedSettings, FeedState, FeedSupervisor, PriceCache, PriceStore, VenueHealth};
use crate::stats::StatsAggregator;
use crate::trading::ExecutionBackend;
use crate::venue::{VenueAdapter, VenueId};

/// How often the engine logs a performance summary.
pub const PERFORMANCE_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Point-in-time engine summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    /// Venues that have delivered prices and are not suspended.
    pub active_venues: usize,
    /// Venues configured.
    pub total_venues: usize,
    /// Distinct (venue, pair) entries in the store.
    pub total_pairs: usize,
    /// Mean poll latency across active venues.
    pub average_poll_latency_ms: f64,
}

/// Owns every component of a running arbitrage engine.
pub struct Engine {
    adapters: Vec<Arc<dyn VenueAdapter>>,
    instruments: Vec<String>,
    scan_params: ScanParams,
    scan_interval: Duration,
    store: Arc<PriceStore>,
    stats: Arc<StatsAggregator>,
    events: EventBus,
    supervisor: FeedSupervisor,
    coordinator: ExecutionCoordinator,
}

impl Engine {
    /// Wire up an engine from config and its collaborators.
    pub fn new(
        config: &Config,
        adapters: Vec<Arc<dyn VenueAdapter>>,
        backend: Arc<dyn ExecutionBackend>,
        cache: Option<Arc<dyn PriceCache>>,
    ) -> Self {
        let venues = adapters.iter().map(|a| a.venue().clone()).collect();
        let store = Arc::new(PriceStore::new(venues, config.history_capacity));
        let stats = Arc::new(StatsAggregator::new());
        let events = EventBus::default();

        let supervisor = FeedSupervisor::new(
            FeedSettings::from_config(config),
            Arc::clone(&store),
            Arc::clone(&stats),
            events.clone(),
            cache,
        );

        let pipeline = ExecutionPipeline::new(
            PipelineSettings::from_config(config),
            backend,
            Arc::clone(&stats),
            events.clone(),
        );
        let coordinator =
            ExecutionCoordinator::new(Arc::new(pipeline), config.max_concurrent_executions);

        Self {
            adapters,
            instruments: config.monitored_instruments.clone(),
            scan_params: ScanParams::from_config(config),
            scan_interval: config.scan_interval(),
            store,
            stats,
            events,
            supervisor,
            coordinator,
        }
    }

    /// Latest prices.
    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    /// Shared stats.
    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    /// Event bus; subscribe before calling [`run`](Self::run) to see everything.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Shared venue health map.
    pub fn health_map(&self) -> Arc<DashMap<VenueId, VenueHealth>> {
        self.supervisor.health_map()
    }

    /// Venue ids in configured order.
    pub fn venues(&self) -> Vec<VenueId> {
        self.adapters.iter().map(|a| a.venue().clone()).collect()
    }

    /// Poll every venue once, concurrently, storing whatever arrives.
    pub async fn poll_all_once(&self) -> Vec<(VenueId, Result<usize, VenueError>)> {
        let polls = self.adapters.iter().map(|adapter| async move {
            let venue = adapter.venue().clone();
            let start = Instant::now();
            let result = self.supervisor.poll_once(adapter.as_ref()).await;
            match &result {
                Ok(_) => self.stats.record_feed_success(&venue, start.elapsed()),
                Err(_) => self.stats.record_feed_failure(&venue),
            }
            (venue, result.map(|quotes| quotes.len()))
        });
        join_all(polls).await
    }

    /// One scan and dispatch cycle.
    #[instrument(skip(self))]
    pub async fn scan_once(&self) -> Vec<ExecutionResult> {
        let opportunities = {
            let _timer = metrics::timer_scan();
            let snapshot = self.store.snapshot();
            scan(&snapshot, &self.instruments, &self.scan_params)
        };

        if opportunities.is_empty() {
            return Vec::new();
        }

        self.stats.record_opportunities(opportunities.len());
        for opp in &opportunities {
            info!(
                pair = %opp.pair,
                buy_venue = %opp.buy_venue,
                sell_venue = %opp.sell_venue,
                buy_price = %opp.buy_price,
                sell_price = %opp.sell_price,
                profit_pct = %opp.profit_pct.round_dp(4),
                "Arbitrage opportunity"
            );
            self.events.publish(EngineEvent::OpportunityFound {
                pair: opp.pair.key(),
                buy_venue: opp.buy_venue.clone(),
                sell_venue: opp.sell_venue.clone(),
                profit_pct: opp.profit_pct,
            });
        }

        self.coordinator.dispatch(opportunities).await
    }

    /// Summary of feed coverage and latency.
    pub fn performance(&self) -> PerformanceReport {
        let snapshot = self.stats.snapshot();
        let health = self.supervisor.health_map();

        let active: Vec<f64> = snapshot
            .venues
            .iter()
            .filter(|(_, v)| v.successes > 0)
            .filter(|(venue, _)| {
                health
                    .get(*venue)
                    .map(|h| !matches!(h.state, FeedState::CircuitOpen | FeedState::Stopped))
                    .unwrap_or(true)
            })
            .map(|(_, v)| v.average_poll_latency_ms)
            .collect();

        let average_poll_latency_ms = if active.is_empty() {
            0.0
        } else {
            active.iter().sum::<f64>() / active.len() as f64
        };

        PerformanceReport {
            active_venues: active.len(),
            total_venues: self.adapters.len(),
            total_pairs: self.store.pair_count(),
            average_poll_latency_ms,
        }
    }

    fn log_performance(&self) {
        let report = self.performance();
        let exec = self.stats.snapshot().execution;
        info!(
            active_venues = report.active_venues,
            total_venues = report.total_venues,
            total_pairs = report.total_pairs,
            avg_poll_latency_ms = format!("{:.1}", report.average_poll_latency_ms),
            opportunities = exec.opportunities_found,
            executions = exec.attempts,
            successes = exec.successes,
            realized_profit = %exec.total_realized_profit,
            "Performance report"
        );
    }

    /// Run feeds and the scan loop until `shutdown` flips to true.
    ///
    /// A dispatch already in flight completes before feeds are stopped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.supervisor.start(&self.adapters).await;
        info!(
            venues = self.adapters.len(),
            instruments = self.instruments.len(),
            scan_interval_ms = self.scan_interval.as_millis() as u64,
            "Engine started"
        );

        let mut last_report = Instant::now();
        let mut cycles = 0u64;

        while !*shutdown.borrow() {
            cycles += 1;
            let results = self.scan_once().await;
            if !results.is_empty() {
                let settled = results.iter().filter(|r| r.success).count();
                debug!(cycle = cycles, executed = results.len(), settled, "Cycle complete");
            }

            if last_report.elapsed() >= PERFORMANCE_REPORT_INTERVAL {
                self.log_performance();
                last_report = Instant::now();
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown sender dropped, stopping engine");
                    }
                    break;
                }
                _ = sleep(self.scan_interval) => {}
            }
        }

        info!(cycles, "Engine stopping");
        self.supervisor.stop().await;
        self.log_performance();
    }
}
