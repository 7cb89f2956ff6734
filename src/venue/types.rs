//! Venue, instrument pair and quote types.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Separator between the two instruments of a pair key.
pub const PAIR_SEPARATOR: char = '-';

/// Identifier of a price venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(String);

impl VenueId {
    /// Create a venue id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Venues with a built-in HTTP adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum VenueKind {
    /// Jupiter aggregator.
    Jupiter,
    /// Raydium AMM.
    Raydium,
    /// Meteora DLMM.
    Meteora,
}

impl VenueKind {
    /// Trading fee charged by the venue, in basis points.
    pub fn fee_bps(&self) -> u16 {
        match self {
            VenueKind::Jupiter => 0,
            VenueKind::Raydium => 25,
            VenueKind::Meteora => 1,
        }
    }

    /// Venue id used in the price store.
    pub fn id(&self) -> VenueId {
        VenueId::new(self.to_string())
    }
}

/// Ordered instrument pair (A, B). Its price is units of B per unit of A.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentPair {
    /// Instrument being priced (A).
    pub base: String,
    /// Instrument the price is quoted in (B).
    pub quote: String,
}

impl InstrumentPair {
    /// Create a new pair.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Parse a canonical `"A-B"` key.
    ///
    /// Returns `None` unless the key has exactly one separator and two
    /// non-empty sides.
    pub fn from_key(key: &str) -> Option<Self> {
        let (base, quote) = key.split_once(PAIR_SEPARATOR)?;
        if base.is_empty() || quote.is_empty() || quote.contains(PAIR_SEPARATOR) {
            return None;
        }
        Some(Self::new(base, quote))
    }

    /// Canonical key `"A-B"`.
    pub fn key(&self) -> String {
        format!("{}{}{}", self.base, PAIR_SEPARATOR, self.quote)
    }

    /// Key of the reciprocal pair `"B-A"`.
    pub fn reverse_key(&self) -> String {
        format!("{}{}{}", self.quote, PAIR_SEPARATOR, self.base)
    }
}

impl fmt::Display for InstrumentPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base, PAIR_SEPARATOR, self.quote)
    }
}

/// One price observation as returned by a venue's bulk price call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Units of quote per unit of base.
    pub price: Decimal,
    /// Liquidity estimate.
    pub liquidity: Decimal,
    /// Price impact estimate, in percent.
    pub price_impact: Decimal,
    /// When the venue produced the price.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl PricePoint {
    /// Create a price point stamped now.
    pub fn now(price: Decimal, liquidity: Decimal) -> Self {
        Self {
            price,
            liquidity,
            price_impact: Decimal::ZERO,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// A price observation attributed to a venue and pair. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueQuote {
    /// Venue that produced the quote.
    pub venue: VenueId,
    /// Pair the price refers to.
    pub pair: InstrumentPair,
    /// Units of quote per unit of base.
    pub price: Decimal,
    /// Liquidity estimate.
    pub liquidity: Decimal,
    /// Price impact estimate, in percent.
    pub price_impact: Decimal,
    /// When the venue produced the price.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl VenueQuote {
    /// Attribute a price point to a venue and pair.
    pub fn from_point(venue: VenueId, pair: InstrumentPair, point: PricePoint) -> Self {
        Self {
            venue,
            pair,
            price: point.price,
            liquidity: point.liquidity,
            price_impact: point.price_impact,
            timestamp: point.timestamp,
        }
    }

    /// Check whether the quote is older than `max_age` at `now`.
    pub fn is_stale(&self, now: OffsetDateTime, max_age: std::time::Duration) -> bool {
        let age = now - self.timestamp;
        age > time::Duration::try_from(max_age).unwrap_or(time::Duration::MAX)
    }
}

/// Swap quote for a specific amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Venue that quoted.
    pub venue: VenueId,
    /// Input instrument.
    pub input: String,
    /// Output instrument.
    pub output: String,
    /// Input amount in base units.
    pub in_amount: u64,
    /// Output amount in base units.
    pub out_amount: u64,
    /// Price impact, in percent.
    pub price_impact_pct: Decimal,
    /// Pools or hops the venue would route through.
    pub route: Vec<String>,
}

impl Quote {
    /// Effective price: output per unit of input.
    pub fn price(&self) -> Option<Decimal> {
        if self.in_amount == 0 {
            return None;
        }
        Some(Decimal::from(self.out_amount) / Decimal::from(self.in_amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn pair_keys_are_canonical() {
        let pair = InstrumentPair::new("SOL", "USDC");
        assert_eq!(pair.key(), "SOL-USDC");
        assert_eq!(pair.reverse_key(), "USDC-SOL");
        assert_eq!(pair.to_string(), "SOL-USDC");
    }

    #[test]
    fn from_key_rejects_malformed() {
        assert_eq!(
            InstrumentPair::from_key("SOL-USDC"),
            Some(InstrumentPair::new("SOL", "USDC"))
        );
        assert_eq!(InstrumentPair::from_key("SOLUSDC"), None);
        assert_eq!(InstrumentPair::from_key("-USDC"), None);
        assert_eq!(InstrumentPair::from_key("SOL-"), None);
        assert_eq!(InstrumentPair::from_key("A-B-C"), None);
    }

    #[test]
    fn venue_kind_parsing() {
        assert_eq!(VenueKind::from_str("jupiter").unwrap(), VenueKind::Jupiter);
        assert_eq!(VenueKind::from_str("Raydium").unwrap(), VenueKind::Raydium);
        assert!(VenueKind::from_str("phoenix").is_err());
        assert_eq!(VenueKind::Meteora.id().as_str(), "meteora");
        assert_eq!(VenueKind::Raydium.fee_bps(), 25);
    }

    #[test]
    fn staleness_uses_age() {
        let now = OffsetDateTime::now_utc();
        let quote = VenueQuote {
            venue: VenueId::new("v1"),
            pair: InstrumentPair::new("SOL", "USDC"),
            price: dec!(100),
            liquidity: dec!(1000),
            price_impact: Decimal::ZERO,
            timestamp: now - time::Duration::seconds(11),
        };
        assert!(quote.is_stale(now, std::time::Duration::from_secs(10)));
        assert!(!quote.is_stale(now, std::time::Duration::from_secs(12)));
    }

    #[test]
    fn quote_price_is_out_over_in() {
        let quote = Quote {
            venue: VenueId::new("jupiter"),
            input: "SOL".to_string(),
            output: "USDC".to_string(),
            in_amount: 1_000_000_000,
            out_amount: 150_250_000_000,
            price_impact_pct: Decimal::ZERO,
            route: vec![],
        };
        assert_eq!(quote.price(), Some(dec!(150.25)));
    }
}
