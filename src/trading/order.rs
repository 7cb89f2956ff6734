//! Swap order types and construction.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::venue::{InstrumentPair, VenueId};

/// Basis points in one whole.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Direction of a hop relative to the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HopDirection {
    /// Base into quote (A to B).
    BaseToQuote,
    /// Quote into base (B to A).
    QuoteToBase,
}

/// One swap at one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapHop {
    /// Venue executing the swap.
    pub venue: VenueId,
    /// Swap direction.
    pub direction: HopDirection,
    /// Instrument sold.
    pub input: String,
    /// Instrument bought.
    pub output: String,
    /// Amount sold, in base units.
    pub amount_in: u64,
    /// Least acceptable amount bought, in base units.
    pub min_out: u64,
}

/// Order handed to the execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOrder {
    /// Client-side order id.
    pub id: String,
    /// Pair being arbitraged.
    pub pair: InstrumentPair,
    /// Hops in execution order.
    pub hops: SmallVec<[SwapHop; 2]>,
    /// Position size in instrument units.
    pub size: Decimal,
    /// Profit estimate the order was sized from.
    pub estimated_profit: Decimal,
    /// Least acceptable profit, in base units.
    pub min_profit: u64,
    /// Slippage tolerance applied to every hop.
    pub max_slippage_bps: u16,
    /// When the order was built.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SwapOrder {
    /// Amount entering the first hop.
    pub fn amount_in(&self) -> u64 {
        self.hops.first().map(|h| h.amount_in).unwrap_or(0)
    }

    /// Least acceptable output of the last hop.
    pub fn final_min_out(&self) -> u64 {
        self.hops.last().map(|h| h.min_out).unwrap_or(0)
    }

    /// Check structural consistency before submission.
    pub fn validate(&self) -> Result<(), String> {
        if self.hops.is_empty() {
            return Err("order has no hops".to_string());
        }
        if self.amount_in() == 0 {
            return Err("amount_in must be positive".to_string());
        }
        for pair in self.hops.windows(2) {
            if pair[1].amount_in != pair[0].min_out {
                return Err(format!(
                    "hop at {} does not consume previous min_out",
                    pair[1].venue
                ));
            }
        }
        Ok(())
    }
}

/// `amount * (10000 - slippage_bps) / 10000`, rounded down.
///
/// Returns `None` if `slippage_bps` exceeds 10000.
pub fn min_out_after_slippage(amount: u64, slippage_bps: u16) -> Option<u64> {
    let keep = BPS_DENOMINATOR.checked_sub(u64::from(slippage_bps))?;
    let out = u128::from(amount) * u128::from(keep) / u128::from(BPS_DENOMINATOR);
    u64::try_from(out).ok()
}

/// Convert an instrument amount to integer base units, truncating dust.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Option<u64> {
    let scale = Decimal::from(10u64.checked_pow(decimals)?);
    amount.checked_mul(scale)?.trunc().to_u64()
}

/// Build chained hops along `path`.
///
/// The first hop swaps A into B; every later hop swaps B back into A. Each
/// hop's `min_out` becomes the next hop's `amount_in`.
pub fn build_hops(
    pair: &InstrumentPair,
    path: &[VenueId],
    amount_in: u64,
    slippage_bps: u16,
) -> Option<SmallVec<[SwapHop; 2]>> {
    let mut hops = SmallVec::new();
    let mut current = amount_in;

    for (i, venue) in path.iter().enumerate() {
        let (direction, input, output) = if i == 0 {
            (HopDirection::BaseToQuote, &pair.base, &pair.quote)
        } else {
            (HopDirection::QuoteToBase, &pair.quote, &pair.base)
        };
        let min_out = min_out_after_slippage(current, slippage_bps)?;
        hops.push(SwapHop {
            venue: venue.clone(),
            direction,
            input: input.clone(),
            output: output.clone(),
            amount_in: current,
            min_out,
        });
        current = min_out;
    }

    Some(hops)
}
