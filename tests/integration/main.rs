//! End-to-end tests for the arbitrage engine.
//!
//! Venues are scripted mock adapters and orders settle through the
//! simulated backend, so no network access is needed. Time is paused and
//! advanced by tokio.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;

use dex_arb::config::Config;
use dex_arb::engine::Engine;
use dex_arb::events::EngineEvent;
use dex_arb::prices::FeedState;
use dex_arb::trading::SimulatedBackend;
use dex_arb::venue::{MockConfig, MockVenueAdapter, VenueAdapter, VenueId};

fn sol_usdc_config() -> Config {
    Config {
        monitored_instruments: vec!["SOL".to_string(), "USDC".to_string()],
        venues: vec!["jupiter".into(), "raydium".into(), "meteora".into()],
        ..Config::default()
    }
}

fn priced(venue: &str, key: &str, price: Decimal) -> Arc<dyn VenueAdapter> {
    Arc::new(MockVenueAdapter::new(venue).with_price(key, price))
}

fn failing(venue: &str) -> Arc<dyn VenueAdapter> {
    Arc::new(MockVenueAdapter::with_config(
        venue,
        MockConfig {
            fail_all: true,
            ..Default::default()
        },
    ))
}

fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Run `engine` for `duration` of (paused) time, then shut it down.
async fn run_for(engine: &Engine, duration: Duration) {
    let (tx, rx) = watch::channel(false);
    let stopper = async {
        sleep(duration).await;
        tx.send_replace(true);
    };
    tokio::join!(engine.run(rx), stopper);
}

#[tokio::test(start_paused = true)]
async fn three_venue_spread_is_executed() {
    let backend = SimulatedBackend::new();
    let engine = Engine::new(
        &sol_usdc_config(),
        vec![
            priced("jupiter", "SOL-USDC", dec!(99.50)),
            priced("raydium", "SOL-USDC", dec!(98.99)),
            priced("meteora", "SOL-USDC", dec!(99.68)),
        ],
        Arc::new(backend.clone()),
        None,
    );
    let mut rx = engine.events().subscribe();

    run_for(&engine, Duration::from_millis(350)).await;

    let events = drain(&mut rx);
    let found: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::OpportunityFound {
                pair,
                buy_venue,
                sell_venue,
                profit_pct,
            } => Some((pair.as_str(), buy_venue, sell_venue, profit_pct.round_dp(3))),
            _ => None,
        })
        .collect();

    assert!(!found.is_empty());
    for (pair, buy, sell, pct) in &found {
        assert_eq!(*pair, "SOL-USDC");
        assert_eq!(*buy, &VenueId::new("raydium"));
        assert_eq!(*sell, &VenueId::new("meteora"));
        assert_eq!(*pct, dec!(0.697));
    }

    let stats = engine.stats().snapshot();
    assert_eq!(stats.execution.opportunities_found, found.len() as u64);
    assert_eq!(stats.execution.attempts, found.len() as u64);
    assert_eq!(stats.execution.successes, stats.execution.attempts);
    assert_eq!(backend.submissions(), stats.execution.attempts);
    assert_eq!(
        stats.execution.total_realized_profit,
        dec!(0.69) * Decimal::from(stats.execution.successes)
    );
}

#[tokio::test(start_paused = true)]
async fn reciprocal_quotes_are_compared() {
    // One venue quotes SOL-USDC, the other only USDC-SOL.
    let engine = Engine::new(
        &sol_usdc_config(),
        vec![
            priced("raydium", "SOL-USDC", dec!(100)),
            priced("meteora", "USDC-SOL", dec!(0.0098)),
        ],
        Arc::new(SimulatedBackend::new()),
        None,
    );

    engine.poll_all_once().await;
    let results = engine.scan_once().await;

    // 1 / 0.0098 = 102.04..., a 2.04% spread over raydium.
    assert_eq!(results.len(), 1);
    let opp = &results[0].opportunity;
    assert_eq!(opp.buy_venue, VenueId::new("raydium"));
    assert_eq!(opp.sell_venue, VenueId::new("meteora"));
    assert_eq!(opp.profit_pct.round_dp(2), dec!(2.04));
    assert!(results[0].success);
}

#[tokio::test(start_paused = true)]
async fn all_venues_failing_opens_every_circuit() {
    let backend = SimulatedBackend::new();
    let engine = Engine::new(
        &sol_usdc_config(),
        vec![failing("jupiter"), failing("raydium"), failing("meteora")],
        Arc::new(backend.clone()),
        None,
    );
    let mut rx = engine.events().subscribe();

    let (tx, shutdown) = watch::channel(false);
    let observer = async {
        // Failures at 0, 2, 6, 14 and 30 seconds trip the breaker.
        sleep(Duration::from_secs(35)).await;
        let health = engine.health_map();
        for venue in ["jupiter", "raydium", "meteora"] {
            let h = health.get(&VenueId::new(venue)).unwrap();
            assert_eq!(h.state, FeedState::CircuitOpen, "{venue}");
            assert!(h.circuit_open_until.is_some());
        }
        tx.send_replace(true);
    };
    tokio::join!(engine.run(shutdown), observer);

    let events = drain(&mut rx);
    let opened: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::CircuitOpened {
                venue,
                consecutive_failures,
                cooldown_seconds,
            } => Some((venue.as_str(), *consecutive_failures, *cooldown_seconds)),
            _ => None,
        })
        .collect();

    assert_eq!(opened.len(), 3);
    assert!(opened.iter().all(|(_, failures, cooldown)| *failures == 5 && *cooldown == 30));
    assert!(events.iter().all(|e| e.kind() != "opportunity_found"));

    let stats = engine.stats().snapshot();
    assert_eq!(stats.execution.attempts, 0);
    assert_eq!(backend.submissions(), 0);
    for venue in ["jupiter", "raydium", "meteora"] {
        let feed = &stats.venues[&VenueId::new(venue)];
        assert_eq!(feed.failures, 5);
        assert_eq!(feed.circuit_opens, 1);
        assert_eq!(feed.successes, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn failing_venue_does_not_block_others() {
    let engine = Engine::new(
        &sol_usdc_config(),
        vec![
            failing("jupiter"),
            priced("raydium", "SOL-USDC", dec!(98.99)),
            priced("meteora", "SOL-USDC", dec!(99.68)),
        ],
        Arc::new(SimulatedBackend::new()),
        None,
    );

    run_for(&engine, Duration::from_millis(500)).await;

    let stats = engine.stats().snapshot();
    assert!(stats.execution.successes > 0);
    assert_eq!(stats.venues[&VenueId::new("jupiter")].successes, 0);
    assert!(stats.venues[&VenueId::new("raydium")].successes > 0);
    assert!(stats.venues[&VenueId::new("meteora")].successes > 0);
}

#[tokio::test(start_paused = true)]
async fn backend_failures_are_counted_not_fatal() {
    let backend = SimulatedBackend::new();
    backend.set_failing(true);
    let engine = Engine::new(
        &sol_usdc_config(),
        vec![
            priced("raydium", "SOL-USDC", dec!(98.99)),
            priced("meteora", "SOL-USDC", dec!(99.68)),
        ],
        Arc::new(backend.clone()),
        None,
    );
    let mut rx = engine.events().subscribe();

    run_for(&engine, Duration::from_millis(350)).await;

    let stats = engine.stats().snapshot();
    assert!(stats.execution.attempts > 0);
    assert_eq!(stats.execution.failures, stats.execution.attempts);
    assert_eq!(stats.execution.successes, 0);
    assert_eq!(stats.success_rate, 0.0);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| e.kind() == "execution_failed"));
    assert!(events.iter().all(|e| e.kind() != "execution_succeeded"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_executions_in_flight() {
    let backend = SimulatedBackend::new().with_latency(Duration::from_secs(3));
    let engine = Engine::new(
        &sol_usdc_config(),
        vec![
            priced("raydium", "SOL-USDC", dec!(98.99)),
            priced("meteora", "SOL-USDC", dec!(99.68)),
        ],
        Arc::new(backend.clone()),
        None,
    );
    let mut rx = engine.events().subscribe();

    let started = tokio::time::Instant::now();
    run_for(&engine, Duration::from_millis(500)).await;

    // Shutdown arrived mid-settlement; the run returns only once it settled.
    assert!(started.elapsed() >= Duration::from_secs(3));

    let stats = engine.stats().snapshot();
    assert!(stats.execution.attempts > 0);
    assert_eq!(
        stats.execution.attempts,
        stats.execution.successes + stats.execution.failures
    );
    assert_eq!(stats.execution.failures, 0);
    assert_eq!(backend.submissions(), stats.execution.attempts);

    let events = drain(&mut rx);
    let settled = events
        .iter()
        .filter(|e| e.kind() == "execution_succeeded")
        .count() as u64;
    assert_eq!(settled, stats.execution.successes);
}
