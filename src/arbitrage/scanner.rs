//! Cross-venue opportunity scanning.
//!
//! [`scan`] is a pure function of a price snapshot.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::prices::PriceSnapshot;
use crate::venue::{InstrumentPair, VenueId};

/// Detected cross-venue price discrepancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArbitrageOpportunity {
    /// Pair being traded.
    pub pair: InstrumentPair,
    /// Venue with the lowest price.
    pub buy_venue: VenueId,
    /// Venue with the highest price.
    pub sell_venue: VenueId,
    /// Price at the buy venue.
    pub buy_price: Decimal,
    /// Price at the sell venue.
    pub sell_price: Decimal,
    /// Spread over the buy price, in percent.
    pub profit_pct: Decimal,
    /// `(sell - buy) * position_size`, never negative.
    pub estimated_profit: Decimal,
    /// Venues in execution order.
    pub path: SmallVec<[VenueId; 2]>,
    /// When the scanner found it.
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
}

/// Scanner inputs that do not come from the snapshot.
#[derive(Debug, Clone)]
pub struct ScanParams {
    /// Minimum spread, in percent.
    pub min_profit_pct: Decimal,
    /// Position size used for the profit estimate.
    pub position_size: Decimal,
    /// Quotes older than this are ignored.
    pub max_age: Duration,
}

impl ScanParams {
    /// Build from config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_profit_pct: config.min_profit_threshold_pct,
            position_size: config.max_position_size,
            max_age: config.price_staleness(),
        }
    }
}

/// A usable price for a pair at one venue.
struct Observation<'a> {
    venue: &'a VenueId,
    price: Decimal,
}

/// Price of `pair` at `venue`: the direct key if present, else the
/// reciprocal of the reverse key. Stale and non-positive prices are skipped.
fn observe<'a>(
    snapshot: &PriceSnapshot,
    venue: &'a VenueId,
    pair: &InstrumentPair,
    max_age: Duration,
) -> Option<Observation<'a>> {
    let fresh = |key: &str| {
        snapshot
            .get(venue, key)
            .filter(|q| !q.is_stale(snapshot.taken_at, max_age))
            .filter(|q| q.price > Decimal::ZERO)
            .map(|q| q.price)
    };

    if snapshot.get(venue, &pair.key()).is_some() {
        return fresh(&pair.key()).map(|price| Observation { venue, price });
    }

    fresh(&pair.reverse_key()).and_then(|p| {
        Decimal::ONE
            .checked_div(p)
            .map(|price| Observation { venue, price })
    })
}

/// Best buy/sell for one pair across venues, if it clears the threshold.
fn best_spread(
    snapshot: &PriceSnapshot,
    pair: &InstrumentPair,
    params: &ScanParams,
) -> Option<ArbitrageOpportunity> {
    let mut observations = snapshot
        .venues
        .iter()
        .filter_map(|venue| observe(snapshot, venue, pair, params.max_age));

    let first = observations.next()?;
    let (mut low, mut high) = ((first.venue, first.price), (first.venue, first.price));

    // Strict comparisons: the first venue seen wins ties.
    for obs in observations {
        if obs.price < low.1 {
            low = (obs.venue, obs.price);
        }
        if obs.price > high.1 {
            high = (obs.venue, obs.price);
        }
    }

    let ((buy_venue, buy_price), (sell_venue, sell_price)) = (low, high);
    if buy_venue == sell_venue || sell_price <= buy_price {
        return None;
    }

    // A pair whose figures overflow is skipped.
    let spread = sell_price.checked_sub(buy_price)?;
    let profit_pct = spread
        .checked_div(buy_price)?
        .checked_mul(Decimal::ONE_HUNDRED)?;
    if profit_pct < params.min_profit_pct {
        return None;
    }
    let estimated_profit = spread.checked_mul(params.position_size)?;

    Some(ArbitrageOpportunity {
        pair: pair.clone(),
        buy_venue: buy_venue.clone(),
        sell_venue: sell_venue.clone(),
        buy_price,
        sell_price,
        profit_pct,
        estimated_profit: estimated_profit.max(Decimal::ZERO),
        path: smallvec![buy_venue.clone(), sell_venue.clone()],
        detected_at: snapshot.taken_at,
    })
}

/// Find opportunities across all pairs of monitored instruments.
///
/// Pairs are taken in configured order (A before B), so each unordered pair
/// is considered once. Results are sorted by profit percentage, highest
/// first; equal percentages keep pair order.
#[instrument(skip_all, fields(entries = snapshot.len(), instruments = instruments.len()))]
pub fn scan(
    snapshot: &PriceSnapshot,
    instruments: &[String],
    params: &ScanParams,
) -> Vec<ArbitrageOpportunity> {
    let mut found = Vec::new();

    for (i, base) in instruments.iter().enumerate() {
        for quote in &instruments[i + 1..] {
            if base == quote {
                continue;
            }
            let pair = InstrumentPair::new(base.as_str(), quote.as_str());
            if let Some(opportunity) = best_spread(snapshot, &pair, params) {
                debug!(
                    pair = %opportunity.pair,
                    buy_venue = %opportunity.buy_venue,
                    sell_venue = %opportunity.sell_venue,
                    profit_pct = %opportunity.profit_pct,
                    "Opportunity found"
                );
                found.push(opportunity);
            }
        }
    }

    found.sort_by(|a, b| b.profit_pct.cmp(&a.profit_pct));
    found
}
