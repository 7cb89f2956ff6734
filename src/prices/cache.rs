//! Optional write-through price cache.
//!
//! Cached prices only give other processes visibility; the engine never
//! reads them back, so a missing or failing cache changes nothing here.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::BotError;
use crate::venue::{VenueId, VenueQuote};

/// TTL of a per-pair entry.
pub const PAIR_TTL_SECONDS: u64 = 60;
/// TTL of a venue's aggregate entry.
pub const VENUE_TTL_SECONDS: u64 = 30;

/// Sink for freshly polled prices.
#[async_trait]
pub trait PriceCache: Send + Sync {
    /// Write one venue's latest quotes.
    async fn store(&self, venue: &VenueId, quotes: &[VenueQuote]) -> Result<(), BotError>;
}

/// Cached representation of one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedPrice {
    /// Price as a decimal string.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Liquidity as a decimal string.
    #[serde(with = "rust_decimal::serde::str")]
    pub liquidity: Decimal,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

impl From<&VenueQuote> for CachedPrice {
    fn from(quote: &VenueQuote) -> Self {
        Self {
            price: quote.price,
            liquidity: quote.liquidity,
            timestamp: quote.timestamp.unix_timestamp(),
        }
    }
}

/// Key of a single pair entry.
pub fn pair_key(venue: &VenueId, pair_key: &str) -> String {
    format!("price:{venue}:{pair_key}")
}

/// Key of a venue's aggregate entry.
pub fn venue_key(venue: &VenueId) -> String {
    format!("prices:{venue}")
}

/// Redis-backed price cache.
#[derive(Clone)]
pub struct RedisPriceCache {
    conn: ConnectionManager,
    redis_url: String,
}

impl fmt::Debug for RedisPriceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisPriceCache")
            .field("redis_url", &self.redis_url)
            .finish_non_exhaustive()
    }
}

impl RedisPriceCache {
    /// Connect to Redis.
    pub async fn connect(redis_url: &str) -> Result<Self, BotError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(redis_url = %redis_url, "Price cache connected");
        Ok(Self {
            conn,
            redis_url: redis_url.to_string(),
        })
    }
}

#[async_trait]
impl PriceCache for RedisPriceCache {
    async fn store(&self, venue: &VenueId, quotes: &[VenueQuote]) -> Result<(), BotError> {
        let mut conn = self.conn.clone();
        let mut aggregate = HashMap::with_capacity(quotes.len());

        for quote in quotes {
            let key = quote.pair.key();
            let cached = CachedPrice::from(quote);
            let body = serde_json::to_string(&cached)?;
            conn.set_ex::<_, _, ()>(pair_key(venue, &key), body, PAIR_TTL_SECONDS)
                .await?;
            aggregate.insert(key, cached);
        }

        let body = serde_json::to_string(&aggregate)?;
        conn.set_ex::<_, _, ()>(venue_key(venue), body, VENUE_TTL_SECONDS)
            .await?;

        debug!(venue = %venue, pairs = quotes.len(), "Prices cached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::InstrumentPair;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    #[test]
    fn keys_follow_layout() {
        let venue = VenueId::new("raydium");
        assert_eq!(pair_key(&venue, "SOL-USDC"), "price:raydium:SOL-USDC");
        assert_eq!(venue_key(&venue), "prices:raydium");
    }

    #[test]
    fn cached_price_serializes_decimals_as_strings() {
        let quote = VenueQuote {
            venue: VenueId::new("raydium"),
            pair: InstrumentPair::new("SOL", "USDC"),
            price: dec!(150.25),
            liquidity: dec!(1000),
            price_impact: Decimal::ZERO,
            timestamp: datetime!(2024-01-01 0:00 UTC),
        };
        let json = serde_json::to_string(&CachedPrice::from(&quote)).unwrap();
        assert_eq!(json, r#"{"price":"150.25","liquidity":"1000","timestamp":1704067200}"#);
    }
}
