//! Price collection module.
//!
//! This module handles:
//! - The latest-quote store and its history rings
//! - Per-venue polling with backoff and circuit breaking
//! - Optional write-through caching of fresh prices

pub mod cache;
pub mod feed;
pub mod ring;
pub mod store;

pub use cache::{PriceCache, RedisPriceCache};
pub use feed::{FeedSettings, FeedState, FeedSupervisor, VenueHealth};
pub use ring::HistoryRing;
pub use store::{PriceSnapshot, PriceStore};
