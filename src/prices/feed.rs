//! Per-venue polling loops with backoff and circuit breaking.
//!
//! Each venue gets its own task. A venue's failures only affect that
//! venue's data freshness; nothing here is process-fatal.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use strum::Display;
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::cache::PriceCache;
use super::store::PriceStore;
use crate::config::Config;
use crate::error::VenueError;
use crate::events::{EngineEvent, EventBus};
use crate::stats::StatsAggregator;
use crate::venue::{InstrumentPair, VenueAdapter, VenueId, VenueQuote};

/// Where a venue's loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedState {
    /// Sleeping between successful polls.
    #[default]
    Idle,
    /// Request in flight.
    Polling,
    /// Sleeping after a failure.
    BackoffWait,
    /// Suspended after too many failures.
    CircuitOpen,
    /// Loop has exited.
    Stopped,
}

/// Health of one venue feed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VenueHealth {
    /// Current loop state.
    pub state: FeedState,
    /// Failures since the last success or cooldown.
    pub consecutive_failures: u32,
    /// When an open circuit closes again.
    #[serde(with = "time::serde::rfc3339::option")]
    pub circuit_open_until: Option<OffsetDateTime>,
    /// Most recent failure.
    pub last_error: Option<String>,
}

/// Timing and threshold settings shared by every venue loop.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Sleep after a successful poll or invalid data.
    pub poll_interval: Duration,
    /// Upper bound on failure backoff.
    pub max_backoff: Duration,
    /// Consecutive failures that open the circuit.
    pub max_consecutive_failures: u32,
    /// How long an open circuit suspends polling.
    pub circuit_cooldown: Duration,
    /// Deadline for one poll.
    pub poll_timeout: Duration,
}

impl FeedSettings {
    /// Build from config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_backoff: Duration::from_secs(config.max_backoff_seconds),
            max_consecutive_failures: config.max_consecutive_failures,
            circuit_cooldown: config.circuit_cooldown(),
            poll_timeout: config.venue_timeout(),
        }
    }

    /// Backoff after `failures` consecutive failures: `min(max, 2^failures s)`.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let secs = 1u64.checked_shl(failures).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_backoff)
    }
}

/// Shared handles every venue loop writes through.
#[derive(Clone)]
struct FeedContext {
    store: Arc<PriceStore>,
    stats: Arc<StatsAggregator>,
    events: EventBus,
    cache: Option<Arc<dyn PriceCache>>,
    health: Arc<DashMap<VenueId, VenueHealth>>,
    settings: FeedSettings,
}

impl FeedContext {
    fn set_health(&self, venue: &VenueId, f: impl FnOnce(&mut VenueHealth)) {
        let mut health = self.health.entry(venue.clone()).or_default();
        f(&mut health);
    }

    /// One poll: fetch, validate, store, cache.
    async fn poll(&self, adapter: &dyn VenueAdapter) -> Result<Vec<VenueQuote>, VenueError> {
        let venue = adapter.venue();

        let prices = tokio::time::timeout(self.settings.poll_timeout, adapter.get_all_prices())
            .await
            .map_err(|_| VenueError::Timeout {
                venue: venue.clone(),
                timeout_ms: self.settings.poll_timeout.as_millis() as u64,
            })??;

        if prices.is_empty() {
            return Err(VenueError::DataInvalid {
                venue: venue.clone(),
                reason: "empty price set".to_string(),
            });
        }

        let mut quotes = Vec::with_capacity(prices.len());
        for (key, point) in prices {
            let Some(pair) = InstrumentPair::from_key(&key) else {
                debug!(venue = %venue, key = %key, "Skipping malformed pair key");
                continue;
            };
            if point.price <= rust_decimal::Decimal::ZERO {
                debug!(venue = %venue, key = %key, price = %point.price, "Skipping non-positive price");
                continue;
            }
            let quote = VenueQuote::from_point(venue.clone(), pair.clone(), point);
            self.store.upsert(venue, &pair, quote.clone());
            quotes.push(quote);
        }

        if quotes.is_empty() {
            return Err(VenueError::DataInvalid {
                venue: venue.clone(),
                reason: "no usable prices".to_string(),
            });
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(venue, &quotes).await {
                warn!(venue = %venue, error = %e, "Failed to cache prices");
            }
        }

        Ok(quotes)
    }

    /// Sleep unless shutdown arrives first. Returns false on shutdown.
    async fn sleep_or_stop(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            _ = shutdown.changed() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    #[instrument(skip_all, fields(venue = %adapter.venue()))]
    async fn run(self, adapter: Arc<dyn VenueAdapter>, mut shutdown: watch::Receiver<bool>) {
        let venue = adapter.venue().clone();
        let settings = self.settings.clone();
        let mut failures: u32 = 0;

        info!("Venue feed started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_health(&venue, |h| h.state = FeedState::Polling);
            let start = Instant::now();

            let outcome = tokio::select! {
                _ = shutdown.changed() => break,
                outcome = self.poll(adapter.as_ref()) => outcome,
            };

            let wait = match outcome {
                Ok(quotes) => {
                    failures = 0;
                    self.stats.record_feed_success(&venue, start.elapsed());
                    self.set_health(&venue, |h| {
                        h.state = FeedState::Idle;
                        h.consecutive_failures = 0;
                    });
                    debug!(pairs = quotes.len(), latency_ms = start.elapsed().as_millis() as u64, "Updated prices");
                    settings.poll_interval
                }
                Err(e) => {
                    failures += 1;
                    self.stats.record_feed_failure(&venue);
                    warn!(error = %e, consecutive_failures = failures, "Price poll failed");

                    if failures >= settings.max_consecutive_failures {
                        if !self.open_circuit(&venue, failures, &e, &mut shutdown).await {
                            break;
                        }
                        failures = 0;
                        continue;
                    }

                    let backoff = e.wants_backoff();
                    self.set_health(&venue, |h| {
                        h.state = if backoff { FeedState::BackoffWait } else { FeedState::Idle };
                        h.consecutive_failures = failures;
                        h.last_error = Some(e.to_string());
                    });
                    if backoff {
                        settings.backoff_delay(failures)
                    } else {
                        settings.poll_interval
                    }
                }
            };

            if !Self::sleep_or_stop(wait, &mut shutdown).await {
                break;
            }
        }

        self.set_health(&venue, |h| h.state = FeedState::Stopped);
        info!("Venue feed stopped");
    }

    /// Suspend the venue for the cooldown. Returns false on shutdown.
    async fn open_circuit(
        &self,
        venue: &VenueId,
        failures: u32,
        last_error: &VenueError,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let cooldown = self.settings.circuit_cooldown;
        let until = OffsetDateTime::now_utc() + cooldown;

        error!(consecutive_failures = failures, cooldown_s = cooldown.as_secs(), "Too many consecutive failures, opening circuit");
        self.stats.record_circuit_open(venue);
        self.set_health(venue, |h| {
            h.state = FeedState::CircuitOpen;
            h.consecutive_failures = failures;
            h.circuit_open_until = Some(until);
            h.last_error = Some(last_error.to_string());
        });
        self.events.publish(EngineEvent::CircuitOpened {
            venue: venue.clone(),
            consecutive_failures: failures,
            cooldown_seconds: cooldown.as_secs(),
        });

        if !Self::sleep_or_stop(cooldown, shutdown).await {
            return false;
        }

        self.set_health(venue, |h| {
            h.state = FeedState::Idle;
            h.consecutive_failures = 0;
            h.circuit_open_until = None;
        });
        self.events.publish(EngineEvent::CircuitClosed {
            venue: venue.clone(),
        });
        info!("Circuit closed, resuming polling");
        true
    }
}

/// Runs one polling task per venue.
pub struct FeedSupervisor {
    ctx: FeedContext,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedSupervisor {
    /// Create a supervisor writing into `store`.
    pub fn new(
        settings: FeedSettings,
        store: Arc<PriceStore>,
        stats: Arc<StatsAggregator>,
        events: EventBus,
        cache: Option<Arc<dyn PriceCache>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx: FeedContext {
                store,
                stats,
                events,
                cache,
                health: Arc::new(DashMap::new()),
                settings,
            },
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one loop per adapter.
    pub async fn start(&self, adapters: &[Arc<dyn VenueAdapter>]) {
        let mut handles = self.handles.lock().await;
        for adapter in adapters {
            let venue = adapter.venue().clone();
            self.ctx.stats.register_venue(&venue);
            self.ctx.health.insert(venue, VenueHealth::default());

            let ctx = self.ctx.clone();
            let rx = self.shutdown.subscribe();
            handles.push(tokio::spawn(ctx.run(Arc::clone(adapter), rx)));
        }
        info!(venues = adapters.len(), "Feed supervisor started");
    }

    /// Signal every loop to stop and wait until all have exited.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Venue feed task ended abnormally");
            }
        }
        info!("Feed supervisor stopped");
    }

    /// Poll one adapter once, outside of any loop.
    ///
    /// A venue whose circuit is open is not contacted until the cooldown ends.
    pub async fn poll_once(&self, adapter: &dyn VenueAdapter) -> Result<Vec<VenueQuote>, VenueError> {
        let venue = adapter.venue();
        let open_until = self
            .ctx
            .health
            .get(venue)
            .filter(|h| h.state == FeedState::CircuitOpen)
            .and_then(|h| h.circuit_open_until);
        if let Some(until) = open_until {
            let remaining = until - OffsetDateTime::now_utc();
            if remaining.is_positive() {
                return Err(VenueError::CircuitOpen {
                    venue: venue.clone(),
                    remaining_seconds: remaining.whole_seconds().max(1) as u64,
                });
            }
        }
        self.ctx.poll(adapter).await
    }

    /// Health of every venue, in no particular order.
    pub fn health(&self) -> Vec<(VenueId, VenueHealth)> {
        self.ctx
            .health
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Health of one venue.
    pub fn venue_health(&self, venue: &VenueId) -> Option<VenueHealth> {
        self.ctx.health.get(venue).map(|h| h.clone())
    }

    /// Shared health map, for the HTTP API.
    pub fn health_map(&self) -> Arc<DashMap<VenueId, VenueHealth>> {
        Arc::clone(&self.ctx.health)
    }
}
