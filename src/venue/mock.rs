//! Mock venue adapter for unit testing.
//!
//! This module provides a scripted adapter that can be used in tests
//! without making real network requests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::adapter::VenueAdapter;
use super::types::{PricePoint, Quote, VenueId};
use crate::error::VenueError;

/// Scripted outcome of one `get_all_prices` call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return these prices, stamped at call time.
    Prices(HashMap<String, Decimal>),
    /// Fail as unavailable.
    Unavailable,
    /// Fail as invalid data.
    Invalid,
}

/// Configuration for mock adapter behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Whether every call fails as unavailable.
    pub fail_all: bool,
    /// Whether quote requests fail.
    pub fail_quotes: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

/// Mock venue adapter for testing.
#[derive(Debug, Clone)]
pub struct MockVenueAdapter {
    venue: VenueId,
    config: MockConfig,
    /// Prices returned once the script is exhausted.
    prices: Arc<Mutex<HashMap<String, Decimal>>>,
    /// Responses consumed in order before falling back to `prices`.
    script: Arc<Mutex<VecDeque<MockResponse>>>,
    calls: Arc<AtomicU64>,
}

impl MockVenueAdapter {
    /// Create a new mock adapter with default configuration.
    pub fn new(venue: impl Into<String>) -> Self {
        Self::with_config(venue, MockConfig::default())
    }

    /// Create a mock adapter with custom configuration.
    pub fn with_config(venue: impl Into<String>, config: MockConfig) -> Self {
        Self {
            venue: VenueId::new(venue),
            config,
            prices: Arc::new(Mutex::new(HashMap::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set the steady-state price for a pair key.
    pub fn set_price(&self, key: impl Into<String>, price: Decimal) {
        self.prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), price);
    }

    /// Builder form of [`set_price`](Self::set_price).
    pub fn with_price(self, key: impl Into<String>, price: Decimal) -> Self {
        self.set_price(key, price);
        self
    }

    /// Queue a one-shot response.
    pub fn push_response(&self, response: MockResponse) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Number of `get_all_prices` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> VenueError {
        VenueError::Unavailable {
            venue: self.venue.clone(),
            reason: "mock failure".to_string(),
        }
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

#[async_trait]
impl VenueAdapter for MockVenueAdapter {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    async fn get_quote(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        _slippage_bps: u16,
    ) -> Result<Quote, VenueError> {
        self.simulate_latency().await;

        if self.config.fail_all || self.config.fail_quotes {
            return Err(self.unavailable());
        }

        let price = self
            .prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&format!("{input}-{output}"))
            .copied()
            .ok_or_else(|| VenueError::DataInvalid {
                venue: self.venue.clone(),
                reason: format!("no price for {input}-{output}"),
            })?;

        let out = (Decimal::from(amount) * price).trunc();
        Ok(Quote {
            venue: self.venue.clone(),
            input: input.to_string(),
            output: output.to_string(),
            in_amount: amount,
            out_amount: out.to_u64().unwrap_or(u64::MAX),
            price_impact_pct: Decimal::ZERO,
            route: vec![self.venue.to_string()],
        })
    }

    async fn get_all_prices(&self) -> Result<HashMap<String, PricePoint>, VenueError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.config.fail_all {
            return Err(self.unavailable());
        }

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let prices = match scripted {
            Some(MockResponse::Unavailable) => return Err(self.unavailable()),
            Some(MockResponse::Invalid) => {
                return Err(VenueError::DataInvalid {
                    venue: self.venue.clone(),
                    reason: "mock invalid payload".to_string(),
                })
            }
            Some(MockResponse::Prices(prices)) => prices,
            None => self
                .prices
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        };

        Ok(prices
            .into_iter()
            .map(|(key, price)| (key, PricePoint::now(price, Decimal::ONE_THOUSAND)))
            .collect())
    }
}
