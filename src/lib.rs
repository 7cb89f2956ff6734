//! Cross-venue DEX price monitor and arbitrage engine.
//!
//! The engine polls several swap venues for prices on a set of monitored
//! instruments, looks for the same pair trading at different prices, and
//! routes a two-hop swap (buy where cheap, sell where dear) through an
//! execution backend.
//!
//! # Flow
//!
//! ```text
//! venue adapters ──► feed supervisor ──► price store
//!                                            │ snapshot
//!                                            ▼
//!                  backend ◄── coordinator ◄── scanner
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`venue`]: Venue adapters, pair keys and quotes
//! - [`prices`]: Price store, history and per-venue feeds
//! - [`arbitrage`]: Opportunity scanning and execution
//! - [`trading`]: Swap orders and execution backends
//! - [`engine`]: Wiring of the above into a running engine
//! - [`events`]: Engine event stream
//! - [`stats`]: Counters and latencies
//! - [`metrics`]: Prometheus metrics
//! - [`api`]: HTTP API for health/metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod prices;
pub mod stats;
pub mod trading;
pub mod utils;
pub mod venue;

pub use config::Config;
pub use engine::Engine;
pub use error::{BotError, Result};
