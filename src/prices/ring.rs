//! Fixed-capacity quote history.

use std::collections::VecDeque;

/// FIFO ring that evicts its oldest element once full.
#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> HistoryRing<T> {
    /// Create an empty ring. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, evicting the oldest if full. Returns the evicted item.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// The newest `limit` items, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(limit);
        self.items.iter().skip(skip).cloned().collect()
    }

    /// Most recent item.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of stored items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn evicts_oldest_first() {
        let mut ring = HistoryRing::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.push(5), Some(2));
        assert_eq!(ring.recent(10), vec![3, 4, 5]);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut ring = HistoryRing::new(100);
        for i in 0..1_000 {
            ring.push(i);
            assert!(ring.len() <= 100);
        }
        assert_eq!(ring.len(), 100);
        assert_eq!(ring.latest(), Some(&999));
        assert_eq!(ring.recent(1_000).first(), Some(&900));
    }

    #[test]
    fn recent_returns_newest_in_order() {
        let mut ring = HistoryRing::new(5);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.recent(2), vec![3, 4]);
        assert!(ring.recent(0).is_empty());
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut ring = HistoryRing::new(0);
        ring.push('a');
        ring.push('b');
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.recent(5), vec!['b']);
    }
}
