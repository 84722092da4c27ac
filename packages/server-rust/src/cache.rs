//! Bounded result cache with write-order eviction.
//!
//! Each `put` stamps its entry with a monotonically increasing write
//! sequence. When a new key arrives at capacity, the entry with the lowest
//! sequence (least recently written) is evicted. Reads never touch the
//! sequence, so polling a result does not keep it alive.

use std::collections::{BTreeMap, HashMap};

use inferq_core::PredictionResult;
use parking_lot::RwLock;

/// Default number of results kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Errors from constructing or mutating the cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache capacity must be at least 1")]
    InvalidCapacity,
}

#[derive(Debug, Default)]
struct Entries {
    /// request id -> (write sequence, result)
    by_id: HashMap<String, (u64, PredictionResult)>,
    /// write sequence -> request id, oldest first
    by_write: BTreeMap<u64, String>,
    next_seq: u64,
}

/// Fixed-capacity map from request id to its latest result.
///
/// One writer (the result ingestor) and many readers (poll handlers) share
/// it through an `Arc`; the `RwLock` lets readers proceed concurrently.
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    entries: RwLock<Entries>,
}

impl ResultCache {
    /// Creates an empty cache holding at most `capacity` results.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidCapacity`] when `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::InvalidCapacity);
        }
        Ok(Self {
            capacity,
            entries: RwLock::new(Entries::default()),
        })
    }

    /// Inserts or overwrites the result for `id` and marks it most recently
    /// written. Returns the id evicted to make room, if any.
    pub fn put(&self, id: impl Into<String>, result: PredictionResult) -> Option<String> {
        let id = id.into();
        let mut entries = self.entries.write();
        let seq = entries.next_seq;
        entries.next_seq += 1;

        if let Some((old_seq, _)) = entries.by_id.insert(id.clone(), (seq, result)) {
            entries.by_write.remove(&old_seq);
            entries.by_write.insert(seq, id);
            return None;
        }
        entries.by_write.insert(seq, id);

        if entries.by_id.len() > self.capacity {
            if let Some((_, oldest)) = entries.by_write.pop_first() {
                entries.by_id.remove(&oldest);
                return Some(oldest);
            }
        }
        None
    }

    /// Returns a copy of the result for `id`. Does not change eviction order.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<PredictionResult> {
        self.entries.read().by_id.get(id).map(|(_, result)| result.clone())
    }

    /// Number of cached results.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.read().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached ids from least to most recently written.
    #[cfg(test)]
    fn ids_by_write_order(&self) -> Vec<String> {
        self.entries.read().by_write.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use inferq_core::TaskStatus;
    use proptest::prelude::*;

    use super::*;

    fn result(id: &str, label: &str) -> PredictionResult {
        PredictionResult::completed(id, label, 0.5, "test-engine", 1.0)
    }

    #[test]
    fn zero_capacity_rejected() {
        assert_eq!(ResultCache::new(0).unwrap_err(), CacheError::InvalidCapacity);
    }

    #[test]
    fn put_then_get_returns_same_result() {
        let cache = ResultCache::new(4).unwrap();
        let r = result("a", "POSITIVE");
        cache.put("a", r.clone());
        assert_eq!(cache.get("a"), Some(r));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn unknown_id_is_absent() {
        let cache = ResultCache::new(4).unwrap();
        assert!(cache.get("missing").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_oldest_written() {
        let cache = ResultCache::new(2).unwrap();
        assert_eq!(cache.put("a", result("a", "x")), None);
        assert_eq!(cache.put("b", result("b", "x")), None);
        assert_eq!(cache.put("c", result("c", "x")), Some("a".to_string()));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn overwrite_promotes_and_does_not_evict() {
        let cache = ResultCache::new(2).unwrap();
        cache.put("a", result("a", "first"));
        cache.put("b", result("b", "x"));
        // Rewriting "a" makes "b" the oldest write.
        assert_eq!(cache.put("a", result("a", "second")), None);
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get("a").unwrap().label, "second");

        assert_eq!(cache.put("c", result("c", "x")), Some("b".to_string()));
        assert_eq!(cache.ids_by_write_order(), vec!["a", "c"]);
    }

    #[test]
    fn reads_do_not_promote() {
        let cache = ResultCache::new(2).unwrap();
        cache.put("a", result("a", "x"));
        cache.put("b", result("b", "x"));
        for _ in 0..10 {
            assert!(cache.get("a").is_some());
        }
        // "a" is still the oldest write despite being read.
        assert_eq!(cache.put("c", result("c", "x")), Some("a".to_string()));
    }

    #[test]
    fn duplicate_arrival_overwrites_terminal_status() {
        let cache = ResultCache::new(2).unwrap();
        cache.put("a", PredictionResult::failed("a", "engine"));
        cache.put("a", result("a", "POSITIVE"));
        assert_eq!(cache.get("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn concurrent_readers_with_one_writer() {
        let cache = Arc::new(ResultCache::new(64).unwrap());
        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..1_000 {
                    let id = format!("id-{i}");
                    cache.put(id.clone(), result(&id, "x"));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        let _ = cache.get(&format!("id-{i}"));
                        assert!(cache.size() <= 64);
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cache.size(), 64);
        assert!(cache.get("id-999").is_some());
    }

    proptest! {
        #[test]
        fn holds_exactly_the_n_most_recent_distinct_writes(
            capacity in 1usize..32,
            extra in 1usize..64,
        ) {
            let cache = ResultCache::new(capacity).unwrap();
            let total = capacity + extra;
            for i in 0..total {
                let id = format!("id-{i}");
                cache.put(id.clone(), result(&id, "x"));
                prop_assert!(cache.size() <= capacity);
            }
            prop_assert_eq!(cache.size(), capacity);

            let expected: HashSet<String> =
                (total - capacity..total).map(|i| format!("id-{i}")).collect();
            let actual: HashSet<String> = cache.ids_by_write_order().into_iter().collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn size_never_exceeds_capacity_with_repeats(
            capacity in 1usize..8,
            keys in proptest::collection::vec(0u8..16, 1..200),
        ) {
            let cache = ResultCache::new(capacity).unwrap();
            for key in keys {
                let id = format!("k{key}");
                cache.put(id.clone(), result(&id, "x"));
                prop_assert!(cache.size() <= capacity);
                prop_assert!(cache.get(&id).is_some());
            }
        }
    }
}
