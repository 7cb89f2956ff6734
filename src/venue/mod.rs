//! Venue module for external price sources.
//!
//! This module handles:
//! - Venue, pair and quote types
//! - The `VenueAdapter` trait every venue implements
//! - HTTP adapters for Jupiter, Raydium and Meteora
//! - Outbound request spacing
//! - Mock adapter for testing

pub mod adapter;
pub mod client;
pub mod mock;
pub mod rate_limit;
pub mod types;

pub use adapter::VenueAdapter;
pub use client::HttpVenueAdapter;
pub use mock::{MockConfig, MockResponse, MockVenueAdapter};
pub use rate_limit::RateGate;
pub use types::{InstrumentPair, PricePoint, Quote, VenueId, VenueKind, VenueQuote};
