//! Webhook delivery deduplication

use indexmap::IndexSet;

use crate::config::DEFAULT_DEDUP_CAPACITY;

/// Bounded set of recently processed message ids
///
/// Eviction is FIFO by insertion order: once the set grows past its
/// capacity the oldest tenth of the entries is dropped.
#[derive(Debug)]
pub struct Deduplicator {
    seen: IndexSet<String>,
    capacity: usize,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl Deduplicator {
    /// Create a deduplicator holding at most `capacity` ids
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: IndexSet::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Record `id` and report whether it had already been seen
    ///
    /// Returns `false` on first sight (process the delivery) and `true`
    /// for a repeat (skip it).
    pub fn seen(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return true;
        }

        self.seen.insert(id.to_string());

        if self.seen.len() > self.capacity {
            let evict = (self.capacity / 10).max(1);
            self.seen.drain(..evict);
            tracing::debug!(evicted = evict, "dedup cache trimmed");
        }

        false
    }

    /// Number of ids currently tracked
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sight_then_duplicate() {
        let mut dedup = Deduplicator::default();
        assert!(!dedup.seen("wamid.1"));
        assert!(dedup.seen("wamid.1"));
        assert!(!dedup.seen("wamid.2"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_evicts_oldest_tenth_past_capacity() {
        let mut dedup = Deduplicator::new(2000);
        for i in 0..=2000 {
            assert!(!dedup.seen(&format!("m{i}")));
        }
        // 2001 inserted, oldest 200 dropped
        assert_eq!(dedup.len(), 1801);
        assert!(!dedup.seen("m0"));
        assert!(dedup.seen("m200"));
        assert!(dedup.seen("m2000"));
    }

    #[test]
    fn test_tiny_capacity_still_evicts() {
        let mut dedup = Deduplicator::new(3);
        for id in ["a", "b", "c", "d"] {
            dedup.seen(id);
        }
        assert_eq!(dedup.len(), 3);
        assert!(!dedup.seen("a"));
    }
}
