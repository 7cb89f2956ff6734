//! Single-opportunity execution: size, build, submit, record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::scanner::ArbitrageOpportunity;
use crate::config::Config;
use crate::error::ExecutionError;
use crate::events::{EngineEvent, EventBus};
use crate::stats::StatsAggregator;
use crate::trading::{build_hops, to_base_units, ExecutionBackend, Receipt, SwapOrder};

/// Share of the estimated profit the order insists on.
const MIN_PROFIT_RATIO: Decimal = dec!(0.8);

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Opportunity that was executed.
    pub opportunity: ArbitrageOpportunity,
    /// Whether the order settled.
    pub success: bool,
    /// Backend confirmation id, on success.
    pub confirmation_id: Option<String>,
    /// Profit reported by the backend, zero on failure.
    pub realized_profit: Decimal,
    /// Settlement cost reported by the backend, zero on failure.
    pub settlement_cost: Decimal,
    /// Wall time of the run.
    pub elapsed: Duration,
    /// Failure reason.
    pub error: Option<String>,
}

impl ExecutionResult {
    fn settled(opportunity: ArbitrageOpportunity, receipt: Receipt, elapsed: Duration) -> Self {
        Self {
            opportunity,
            success: true,
            confirmation_id: Some(receipt.confirmation_id),
            realized_profit: receipt.realized_profit,
            settlement_cost: receipt.settlement_cost,
            elapsed,
            error: None,
        }
    }

    /// Failure-flagged result.
    pub fn failed(opportunity: ArbitrageOpportunity, error: impl ToString, elapsed: Duration) -> Self {
        Self {
            opportunity,
            success: false,
            confirmation_id: None,
            realized_profit: Decimal::ZERO,
            settlement_cost: Decimal::ZERO,
            elapsed,
            error: Some(error.to_string()),
        }
    }
}

/// Pipeline parameters taken from config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Upper bound on position size.
    pub max_position_size: Decimal,
    /// Size as a multiple of the estimated profit.
    pub sizing_multiple: Decimal,
    /// Decimal places of the traded instrument.
    pub instrument_decimals: u32,
    /// Slippage tolerance per hop.
    pub max_slippage_bps: u16,
    /// Deadline for one backend submission.
    pub submit_timeout: Duration,
}

impl PipelineSettings {
    /// Build from config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_position_size: config.max_position_size,
            sizing_multiple: config.sizing_multiple,
            instrument_decimals: config.instrument_decimals,
            max_slippage_bps: config.max_slippage_bps,
            submit_timeout: config.submit_timeout(),
        }
    }

    /// Position size for an opportunity.
    pub fn position_size(&self, opportunity: &ArbitrageOpportunity) -> Decimal {
        self.max_position_size
            .min(self.sizing_multiple * opportunity.estimated_profit)
    }
}

/// Runs one opportunity through to a result. One attempt, no retries.
pub struct ExecutionPipeline {
    settings: PipelineSettings,
    backend: Arc<dyn ExecutionBackend>,
    stats: Arc<StatsAggregator>,
    events: EventBus,
    next_order: AtomicU64,
}

impl ExecutionPipeline {
    /// Create a pipeline.
    pub fn new(
        settings: PipelineSettings,
        backend: Arc<dyn ExecutionBackend>,
        stats: Arc<StatsAggregator>,
        events: EventBus,
    ) -> Self {
        Self {
            settings,
            backend,
            stats,
            events,
            next_order: AtomicU64::new(1),
        }
    }

    /// Shared stats.
    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    /// Shared event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Size and build a swap order.
    pub fn build_order(&self, opportunity: &ArbitrageOpportunity) -> Result<SwapOrder, ExecutionError> {
        let size = self.settings.position_size(opportunity);
        if size <= Decimal::ZERO {
            return Err(ExecutionError::Build(format!("non-positive position size {}", size)));
        }

        let decimals = self.settings.instrument_decimals;
        let amount_in = to_base_units(size, decimals)
            .filter(|amount| *amount > 0)
            .ok_or_else(|| ExecutionError::Build(format!("size {} has no base-unit amount", size)))?;
        let min_profit = to_base_units(opportunity.estimated_profit * MIN_PROFIT_RATIO, decimals)
            .ok_or_else(|| ExecutionError::Build("minimum profit out of range".to_string()))?;

        let hops = build_hops(
            &opportunity.pair,
            &opportunity.path,
            amount_in,
            self.settings.max_slippage_bps,
        )
        .ok_or_else(|| ExecutionError::Build("slippage out of range".to_string()))?;

        let n = self.next_order.fetch_add(1, Ordering::Relaxed);
        let order = SwapOrder {
            id: format!("{}-{}", opportunity.pair.key(), n),
            pair: opportunity.pair.clone(),
            hops,
            size,
            estimated_profit: opportunity.estimated_profit,
            min_profit,
            max_slippage_bps: self.settings.max_slippage_bps,
            created_at: OffsetDateTime::now_utc(),
        };
        order.validate().map_err(ExecutionError::Build)?;

        Ok(order)
    }

    async fn submit(&self, order: &SwapOrder) -> Result<Receipt, ExecutionError> {
        let timeout = self.settings.submit_timeout;
        match tokio::time::timeout(timeout, self.backend.submit(order)).await {
            Ok(result) => result.map_err(ExecutionError::from),
            Err(_) => Err(ExecutionError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Execute one opportunity.
    #[instrument(
        skip(self, opportunity),
        fields(pair = %opportunity.pair, buy = %opportunity.buy_venue, sell = %opportunity.sell_venue)
    )]
    pub async fn run(&self, opportunity: ArbitrageOpportunity) -> ExecutionResult {
        let start = Instant::now();
        self.stats.record_attempt();

        let outcome = match self.build_order(&opportunity) {
            Ok(order) => {
                debug!(
                    order_id = %order.id,
                    size = %order.size,
                    amount_in = order.amount_in(),
                    min_out = order.final_min_out(),
                    "Submitting order"
                );
                self.submit(&order).await
            }
            Err(e) => Err(e),
        };

        let elapsed = start.elapsed();
        let pair = opportunity.pair.key();

        match outcome {
            Ok(receipt) => {
                self.stats
                    .record_success(receipt.realized_profit, receipt.settlement_cost, elapsed);
                info!(
                    confirmation_id = %receipt.confirmation_id,
                    realized_profit = %receipt.realized_profit,
                    settlement_cost = %receipt.settlement_cost,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Arbitrage executed"
                );
                self.events.publish(EngineEvent::ExecutionSucceeded {
                    pair,
                    confirmation_id: receipt.confirmation_id.clone(),
                    realized_profit: receipt.realized_profit,
                    elapsed_ms: elapsed.as_millis() as u64,
                });
                ExecutionResult::settled(opportunity, receipt, elapsed)
            }
            Err(e) => {
                self.record_failure(&pair, &e.to_string(), elapsed);
                ExecutionResult::failed(opportunity, e, elapsed)
            }
        }
    }

    /// Count a failed run and announce it.
    pub fn record_failure(&self, pair: &str, reason: &str, elapsed: Duration) {
        self.stats.record_failure(elapsed);
        warn!(pair = %pair, error = %reason, "Execution failed");
        self.events.publish(EngineEvent::ExecutionFailed {
            pair: pair.to_string(),
            reason: reason.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }
}
