//! The capability every price venue exposes.

use std::collections::HashMap;

use async_trait::async_trait;

use super::types::{PricePoint, Quote, VenueId};
use crate::error::VenueError;

/// Quote retrieval for one venue.
///
/// Implementations must tolerate repeated calls; every error is treated as
/// transient by the caller.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue this adapter talks to.
    fn venue(&self) -> &VenueId;

    /// Quote a swap of `amount` base units of `input` into `output`.
    async fn get_quote(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, VenueError>;

    /// Current prices for every pair the venue knows, keyed `"A-B"`.
    async fn get_all_prices(&self) -> Result<HashMap<String, PricePoint>, VenueError>;
}
