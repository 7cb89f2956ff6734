//! Execution backends that settle swap orders.
//!
//! This module handles:
//! - The [`ExecutionBackend`] seam used by the pipeline
//! - A simulated backend for dry runs and tests
//! - An HTTP backend that posts orders to a settlement service

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::order::SwapOrder;
use crate::error::{BackendError, BotError};
use crate::metrics;

/// Base settlement cost of one order, in lamports.
pub const BASE_COST_LAMPORTS: i64 = 5_000;

/// Additional settlement cost per hop, in lamports.
pub const HOP_COST_LAMPORTS: i64 = 1_000;

/// Decimal places between lamports and whole units.
const LAMPORT_SCALE: u32 = 9;

/// Outcome reported by a backend for a settled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Backend confirmation identifier.
    pub confirmation_id: String,
    /// Profit actually realized.
    pub realized_profit: Decimal,
    /// Cost paid to settle.
    pub settlement_cost: Decimal,
}

/// Settles swap orders.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Submit one order and wait for its receipt.
    async fn submit(&self, order: &SwapOrder) -> Result<Receipt, BackendError>;
}

/// Estimated settlement cost for an order with `hops` hops.
pub fn estimated_settlement_cost(hops: usize) -> Decimal {
    let lamports = BASE_COST_LAMPORTS + HOP_COST_LAMPORTS * hops as i64;
    Decimal::new(lamports, LAMPORT_SCALE)
}

/// Backend that settles every order locally.
///
/// Realized profit equals the order's estimate and the cost is the
/// per-hop estimate. Latency and failure can be injected for tests.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    latency: Duration,
    fail: Arc<AtomicBool>,
    submissions: Arc<AtomicU64>,
}

impl SimulatedBackend {
    /// Create a backend that settles immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every submission by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make subsequent submissions fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of orders submitted so far.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBackend for SimulatedBackend {
    async fn submit(&self, order: &SwapOrder) -> Result<Receipt, BackendError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected(format!("simulated rejection of {}", order.id)));
        }

        debug!(order_id = %order.id, hops = order.hops.len(), "Simulated settlement");

        Ok(Receipt {
            confirmation_id: format!("sim-{}", n),
            realized_profit: order.estimated_profit,
            settlement_cost: estimated_settlement_cost(order.hops.len()),
        })
    }
}

/// Settlement service response body.
#[derive(Debug, Clone, Deserialize)]
struct SettlementResponse {
    /// Confirmation id (various field names).
    #[serde(alias = "signature", alias = "txid", alias = "id")]
    confirmation_id: Option<String>,
    /// Realized profit, if the service reports it.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    realized_profit: Option<Decimal>,
    /// Settlement cost, if the service reports it.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    settlement_cost: Option<Decimal>,
    /// Error message if any.
    error: Option<String>,
}

/// Backend that posts orders to a settlement service as JSON.
#[derive(Debug, Clone)]
pub struct HttpSettlementBackend {
    http: reqwest::Client,
    url: String,
}

impl HttpSettlementBackend {
    /// Create a backend posting to `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BotError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ExecutionBackend for HttpSettlementBackend {
    #[instrument(skip(self, order), fields(order_id = %order.id, pair = %order.pair))]
    async fn submit(&self, order: &SwapOrder) -> Result<Receipt, BackendError> {
        let start = Instant::now();

        let response = self
            .http
            .post(&self.url)
            .json(order)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(format!("HTTP request failed: {}", e)))?;

        metrics::record_submit_latency(start);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = format!("HTTP {} - {}", status, body);
            return Err(if status.is_client_error() {
                BackendError::Rejected(reason)
            } else {
                BackendError::Unavailable(reason)
            });
        }

        let result: SettlementResponse = response.json().await?;

        if let Some(error) = result.error {
            return Err(BackendError::Rejected(error));
        }

        let confirmation_id = result
            .confirmation_id
            .ok_or_else(|| BackendError::Rejected("no confirmation id in response".to_string()))?;

        info!(confirmation_id = %confirmation_id, "Order settled");

        Ok(Receipt {
            confirmation_id,
            realized_profit: result.realized_profit.unwrap_or(order.estimated_profit),
            settlement_cost: result
                .settlement_cost
                .unwrap_or_else(|| estimated_settlement_cost(order.hops.len())),
        })
    }
}
