//! Bounded concurrent dispatch of pipeline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, instrument};

use super::pipeline::{ExecutionPipeline, ExecutionResult};
use super::scanner::ArbitrageOpportunity;
use crate::metrics;

/// Runs up to `max_concurrent` pipelines at a time.
pub struct ExecutionCoordinator {
    pipeline: Arc<ExecutionPipeline>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
}

impl ExecutionCoordinator {
    /// Create a coordinator over `pipeline`.
    pub fn new(pipeline: Arc<ExecutionPipeline>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Per-cycle admission limit.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Pipelines currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Execute a batch and wait for every run.
    ///
    /// Only the first `max_concurrent` opportunities are admitted. A run that
    /// panics becomes a failure result; the rest of the batch is unaffected.
    #[instrument(skip_all, fields(candidates = opportunities.len()))]
    pub async fn dispatch(&self, mut opportunities: Vec<ArbitrageOpportunity>) -> Vec<ExecutionResult> {
        opportunities.truncate(self.max_concurrent);
        if opportunities.is_empty() {
            return Vec::new();
        }

        let (kept, handles): (Vec<_>, Vec<_>) = opportunities
            .into_iter()
            .map(|opportunity| {
                let pipeline = Arc::clone(&self.pipeline);
                let permits = Arc::clone(&self.permits);
                let in_flight = Arc::clone(&self.in_flight);
                let task_input = opportunity.clone();

                let handle = tokio::spawn(async move {
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await.ok();
                    let _guard = InFlightGuard::enter(in_flight);
                    pipeline.run(task_input).await
                });

                (opportunity, handle)
            })
            .unzip();

        debug!(admitted = handles.len(), "Dispatched executions");

        join_all(handles)
            .await
            .into_iter()
            .zip(kept)
            .map(|(joined, opportunity)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(pair = %opportunity.pair, error = %e, "Execution task died");
                    let reason = format!("execution task failed: {}", e);
                    self.pipeline
                        .record_failure(&opportunity.pair.key(), &reason, Duration::ZERO);
                    ExecutionResult::failed(opportunity, reason, Duration::ZERO)
                }
            })
            .collect()
    }
}

/// Tracks one running pipeline; released even if the run panics.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_executions_in_flight(now);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.0.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_executions_in_flight(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::pipeline::PipelineSettings;
    use crate::config::Config;
    use crate::error::BackendError;
    use crate::events::EventBus;
    use crate::stats::StatsAggregator;
    use crate::trading::{ExecutionBackend, Receipt, SimulatedBackend, SwapOrder};
    use crate::venue::{InstrumentPair, VenueId};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use smallvec::smallvec;
    use time::OffsetDateTime;

    fn opportunity(base: &str) -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            pair: InstrumentPair::new(base, "USDC"),
            buy_venue: VenueId::new("a"),
            sell_venue: VenueId::new("b"),
            buy_price: dec!(100),
            sell_price: dec!(101),
            profit_pct: dec!(1),
            estimated_profit: dec!(1),
            path: smallvec![VenueId::new("a"), VenueId::new("b")],
            detected_at: OffsetDateTime::now_utc(),
        }
    }

    fn coordinator(backend: Arc<dyn ExecutionBackend>, max: usize) -> ExecutionCoordinator {
        let pipeline = ExecutionPipeline::new(
            PipelineSettings::from_config(&Config::default()),
            backend,
            Arc::new(StatsAggregator::new()),
            EventBus::default(),
        );
        ExecutionCoordinator::new(Arc::new(pipeline), max)
    }

    /// Records the highest number of concurrent submissions.
    #[derive(Default)]
    struct CountingBackend {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionBackend for CountingBackend {
        async fn submit(&self, order: &SwapOrder) -> Result<Receipt, BackendError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Receipt {
                confirmation_id: order.id.clone(),
                realized_profit: order.estimated_profit,
                settlement_cost: Decimal::ZERO,
            })
        }
    }

    /// Fails one pair and panics on another.
    struct FlakyBackend;

    #[async_trait]
    impl ExecutionBackend for FlakyBackend {
        async fn submit(&self, order: &SwapOrder) -> Result<Receipt, BackendError> {
            match order.pair.base.as_str() {
                "BAD" => Err(BackendError::Rejected("insufficient liquidity".to_string())),
                "BOOM" => panic!("backend crashed"),
                _ => Ok(Receipt {
                    confirmation_id: order.id.clone(),
                    realized_profit: order.estimated_profit,
                    settlement_cost: Decimal::ZERO,
                }),
            }
        }
    }

    #[tokio::test]
    async fn empty_batch_does_nothing() {
        let c = coordinator(Arc::new(SimulatedBackend::new()), 3);
        assert!(c.dispatch(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn batch_is_truncated_to_limit() {
        let backend = SimulatedBackend::new();
        let c = coordinator(Arc::new(backend.clone()), 2);

        let results = c
            .dispatch(vec![opportunity("A"), opportunity("B"), opportunity("C")])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(backend.submissions(), 2);
        assert_eq!(results[0].opportunity.pair.base, "A");
        assert_eq!(results[1].opportunity.pair.base, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_never_exceeds_limit() {
        let backend = Arc::new(CountingBackend::default());
        let c = coordinator(backend.clone(), 2);

        // Two overlapping batches share the same permits.
        let (first, second) = tokio::join!(
            c.dispatch(vec![opportunity("A"), opportunity("B")]),
            c.dispatch(vec![opportunity("C"), opportunity("D")]),
        );

        assert_eq!(first.len() + second.len(), 4);
        assert!(first.iter().chain(&second).all(|r| r.success));
        assert_eq!(backend.peak.load(Ordering::SeqCst), 2);
        assert_eq!(c.in_flight(), 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_the_rest() {
        let c = coordinator(Arc::new(FlakyBackend), 4);

        let results = c
            .dispatch(vec![
                opportunity("SOL"),
                opportunity("BAD"),
                opportunity("BOOM"),
                opportunity("JUP"),
            ])
            .await;

        let outcome: Vec<_> = results
            .iter()
            .map(|r| (r.opportunity.pair.base.as_str(), r.success))
            .collect();
        assert_eq!(
            outcome,
            vec![("SOL", true), ("BAD", false), ("BOOM", false), ("JUP", true)]
        );
        assert!(results[2].error.as_deref().unwrap().contains("execution task failed"));

        let snap = c.pipeline.stats().snapshot();
        assert_eq!(snap.execution.attempts, 4);
        assert_eq!(snap.execution.successes, 2);
        assert_eq!(snap.execution.failures, 2);
        assert_eq!(c.in_flight(), 0);
    }
}
