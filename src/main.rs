//! Cross-venue DEX arbitrage engine entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dex_arb::api::{create_router, AppState};
use dex_arb::arbitrage::{scan, ScanParams};
use dex_arb::config::Config;
use dex_arb::engine::Engine;
use dex_arb::events::EngineEvent;
use dex_arb::metrics;
use dex_arb::prices::{PriceCache, RedisPriceCache};
use dex_arb::trading::{ExecutionBackend, HttpSettlementBackend, SimulatedBackend};
use dex_arb::utils::{short_id, shutdown_signal};
use dex_arb::venue::{HttpVenueAdapter, InstrumentPair, VenueKind};

/// Cross-venue DEX arbitrage engine.
#[derive(Parser, Debug)]
#[command(name = "dex-arb")]
#[command(about = "Monitors swap venues for price discrepancies and executes two-hop arbitrage")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine (default).
    Run {
        /// Settle through the simulated backend instead of SETTLEMENT_URL.
        #[arg(long)]
        dry_run: Option<bool>,

        /// HTTP server port for health/metrics (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Poll every venue once and print prices and opportunities.
    PollOnce,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Config errors are reported after logging is up
    let loaded = Config::load();
    let json = loaded.as_ref().map(Config::json_logs).unwrap_or(false);

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("dex_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();

    let config = loaded.map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(config),
        Some(Command::PollOnce) => cmd_poll_once(config).await,
        Some(Command::Run { dry_run, port }) => cmd_run(config, dry_run, port).await,
        None => cmd_run(config, None, None).await,
    }
}

/// Check configuration validity.
fn cmd_check_config(config: Config) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("DEX ARB ENGINE - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Venues:");
    for venue in &config.venues {
        match venue.parse::<VenueKind>() {
            Ok(kind) => println!("    - {} (fee {} bps)", kind, kind.fee_bps()),
            Err(_) => println!("    - {} (unsupported)", venue),
        }
    }
    println!("  Instruments:");
    for instrument in &config.monitored_instruments {
        println!("    - {}", short_id(instrument));
    }
    println!("  Poll Interval: {}s", config.poll_interval_seconds);
    println!("  Scan Interval: {}ms", config.scan_interval_ms);
    println!("  Min Profit: {}%", config.min_profit_threshold_pct);
    println!("  Max Slippage: {} bps", config.max_slippage_bps);
    println!("  Max Position: {}", config.max_position_size);
    println!("  Max Concurrent Executions: {}", config.max_concurrent_executions);
    println!(
        "  Circuit Breaker: {} failures, {}s cooldown",
        config.max_consecutive_failures, config.circuit_cooldown_seconds
    );
    println!("  Dry Run: {}", config.dry_run);
    if let Some(url) = &config.settlement_url {
        println!("  Settlement URL: {}", url);
    }
    println!(
        "  Price Cache: {}",
        if config.redis_url.is_some() { "Redis" } else { "Disabled" }
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Poll every venue once and report what the scanner would see.
async fn cmd_poll_once(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let adapters = HttpVenueAdapter::from_config(&config)?;
    let engine = Engine::new(&config, adapters, Arc::new(SimulatedBackend::new()), None);

    println!("======================================================================");
    println!("DEX ARB ENGINE - SINGLE POLL");
    println!("======================================================================");

    for (venue, result) in engine.poll_all_once().await {
        match result {
            Ok(count) => println!("  {:<10} OK      {} pairs", venue.as_str(), count),
            Err(e) => println!("  {:<10} FAILED  {}", venue.as_str(), e),
        }
    }

    println!("----------------------------------------------------------------------");
    let snapshot = engine.store().snapshot();
    for quote in snapshot.quotes() {
        let pair = InstrumentPair::new(short_id(&quote.pair.base), short_id(&quote.pair.quote));
        println!(
            "  {:<10} {:<24} price={} liquidity={}",
            quote.venue.as_str(),
            pair.to_string(),
            quote.price,
            quote.liquidity
        );
    }

    println!("----------------------------------------------------------------------");
    let opportunities = scan(&snapshot, &config.monitored_instruments, &ScanParams::from_config(&config));
    if opportunities.is_empty() {
        println!("No opportunities above {}%", config.min_profit_threshold_pct);
    }
    for opp in &opportunities {
        println!(
            "  {}: buy {} @ {} -> sell {} @ {} ({:.4}%)",
            InstrumentPair::new(short_id(&opp.pair.base), short_id(&opp.pair.quote)),
            opp.buy_venue,
            opp.buy_price,
            opp.sell_venue,
            opp.sell_price,
            opp.profit_pct
        );
    }
    println!("======================================================================");

    Ok(())
}

/// Log every engine event until the bus closes.
async fn log_events(mut rx: broadcast::Receiver<EngineEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                info!(kind = event.kind(), event = %payload, "Engine event");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Run the engine until Ctrl-C or SIGTERM.
async fn cmd_run(
    mut config: Config,
    dry_run_override: Option<bool>,
    port_override: Option<u16>,
) -> anyhow::Result<()> {
    // Override with CLI args if provided
    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }
    if let Some(port) = port_override {
        config.port = port;
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!(
        mode = if config.dry_run { "SIMULATION" } else { "LIVE" },
        venues = %config.venues.join(","),
        instruments = config.monitored_instruments.len(),
        min_profit_pct = %config.min_profit_threshold_pct,
        "Configuration loaded"
    );

    // Initialize metrics
    let prometheus = match metrics::install_prometheus() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus exporter unavailable");
            None
        }
    };

    let adapters = HttpVenueAdapter::from_config(&config)?;

    let cache: Option<Arc<dyn PriceCache>> = match &config.redis_url {
        Some(url) => match RedisPriceCache::connect(url).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(error = %e, "Price cache unavailable, continuing without it");
                None
            }
        },
        None => None,
    };

    let backend: Arc<dyn ExecutionBackend> = if config.dry_run {
        info!("SIMULATION MODE - orders settle locally");
        Arc::new(SimulatedBackend::new())
    } else {
        let url = config
            .settlement_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("SETTLEMENT_URL is required in live mode"))?;
        Arc::new(HttpSettlementBackend::new(url, config.submit_timeout())?)
    };

    let engine = Engine::new(&config, adapters, backend, cache);
    tokio::spawn(log_events(engine.events().subscribe()));

    // Shutdown fan-out
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_tx.send_replace(true);
    });

    // Start HTTP server
    let mut app_state = AppState::new(Arc::clone(engine.stats()), engine.health_map(), engine.venues())
        .with_dry_run(config.dry_run);
    if let Some(handle) = prometheus {
        app_state = app_state.with_metrics(handle);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    let router = create_router(app_state.clone());
    let mut server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    app_state.set_ready(true);
    engine.run(shutdown_rx).await;
    app_state.set_ready(false);

    match server_handle.await {
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
        Ok(Ok(())) => {}
    }

    let stats = engine.stats().snapshot();
    info!("========================================");
    info!("ENGINE STOPPED - FINAL SUMMARY");
    info!("========================================");
    info!("Opportunities found: {}", stats.execution.opportunities_found);
    info!(
        "Executions: {} attempted, {} settled, {} failed",
        stats.execution.attempts, stats.execution.successes, stats.execution.failures
    );
    info!("Success rate: {:.1}%", stats.success_rate * 100.0);
    info!("Realized profit: {}", stats.execution.total_realized_profit);
    info!("Settlement cost: {}", stats.execution.total_settlement_cost);
    info!("Largest profit: {}", stats.execution.largest_profit);
    info!("Average latency: {:.1}ms", stats.execution.average_latency_ms);
    for (venue, feed) in &stats.venues {
        info!(
            venue = %venue,
            polls = feed.polls,
            failures = feed.failures,
            circuit_opens = feed.circuit_opens,
            "Venue summary"
        );
    }

    Ok(())
}
