//! Latest-quote store with per-key history.

use std::collections::HashMap;
use std::sync::RwLock;

use dashmap::DashMap;
use time::OffsetDateTime;

use super::ring::HistoryRing;
use crate::venue::{InstrumentPair, VenueId, VenueQuote};

type StoreKey = (VenueId, String);

#[derive(Debug)]
struct StoreEntry {
    latest: VenueQuote,
    history: HistoryRing<VenueQuote>,
}

/// Owned copy of every latest quote at one instant.
#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    /// When the snapshot was taken.
    pub taken_at: OffsetDateTime,
    /// Venue iteration order.
    pub venues: Vec<VenueId>,
    entries: HashMap<StoreKey, VenueQuote>,
}

impl PriceSnapshot {
    /// Build a snapshot from quotes, for tests and replays.
    pub fn from_quotes(
        taken_at: OffsetDateTime,
        venues: Vec<VenueId>,
        quotes: impl IntoIterator<Item = VenueQuote>,
    ) -> Self {
        let entries = quotes
            .into_iter()
            .map(|q| ((q.venue.clone(), q.pair.key()), q))
            .collect();
        Self {
            taken_at,
            venues,
            entries,
        }
    }

    /// Latest quote for a venue and pair key.
    pub fn get(&self, venue: &VenueId, pair_key: &str) -> Option<&VenueQuote> {
        self.entries.get(&(venue.clone(), pair_key.to_string()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All quotes, in no particular order.
    pub fn quotes(&self) -> impl Iterator<Item = &VenueQuote> {
        self.entries.values()
    }
}

/// Concurrent store of the latest quote per (venue, pair key).
///
/// Each venue's feed is the only writer of its own keys. Reads copy out.
#[derive(Debug)]
pub struct PriceStore {
    entries: DashMap<StoreKey, StoreEntry>,
    venue_order: RwLock<Vec<VenueId>>,
    history_capacity: usize,
}

impl PriceStore {
    /// Create a store that iterates venues in the given order.
    pub fn new(venues: Vec<VenueId>, history_capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            venue_order: RwLock::new(venues),
            history_capacity,
        }
    }

    /// Overwrite the latest quote for a key and append it to the key's history.
    pub fn upsert(&self, venue: &VenueId, pair: &InstrumentPair, quote: VenueQuote) {
        self.register_venue(venue);

        let mut entry = self
            .entries
            .entry((venue.clone(), pair.key()))
            .or_insert_with(|| StoreEntry {
                latest: quote.clone(),
                history: HistoryRing::new(self.history_capacity),
            });
        entry.history.push(quote.clone());
        entry.latest = quote;
    }

    /// Owned copy of all latest entries.
    pub fn snapshot(&self) -> PriceSnapshot {
        let entries = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().latest.clone()))
            .collect();

        PriceSnapshot {
            taken_at: OffsetDateTime::now_utc(),
            venues: self.venue_order(),
            entries,
        }
    }

    /// Up to `limit` past quotes for a key, most recent last.
    pub fn history(&self, venue: &VenueId, pair: &InstrumentPair, limit: usize) -> Vec<VenueQuote> {
        self.entries
            .get(&(venue.clone(), pair.key()))
            .map(|e| e.history.recent(limit))
            .unwrap_or_default()
    }

    /// Latest quote for a key.
    pub fn latest(&self, venue: &VenueId, pair: &InstrumentPair) -> Option<VenueQuote> {
        self.entries
            .get(&(venue.clone(), pair.key()))
            .map(|e| e.latest.clone())
    }

    /// Number of (venue, pair) keys held.
    pub fn pair_count(&self) -> usize {
        self.entries.len()
    }

    /// Venue iteration order.
    pub fn venue_order(&self) -> Vec<VenueId> {
        self.venue_order
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn register_venue(&self, venue: &VenueId) {
        let known = self
            .venue_order
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(venue);
        if !known {
            let mut order = self.venue_order.write().unwrap_or_else(|e| e.into_inner());
            if !order.contains(venue) {
                order.push(venue.clone());
            }
        }
    }
}
