//! Partition-key routing shared by producers and the bus.
//!
//! Every message is keyed by its request identifier. Routing the key through
//! [`partition_for_key`] sends all messages for one identifier to the same
//! partition, which is the only ordering guarantee the pipeline relies on.

use crate::hash::fnv1a_hash_bytes;

/// Default number of partitions per topic.
pub const DEFAULT_PARTITION_COUNT: u32 = 12;

/// Maps a partition key to a partition in `[0, partition_count)`.
///
/// A `partition_count` of 0 is treated as 1.
///
/// # Examples
///
/// ```
/// use inferq_core::partition::partition_for_key;
///
/// let p = partition_for_key(b"request-1", 12);
/// assert!(p < 12);
/// assert_eq!(p, partition_for_key(b"request-1", 12));
/// ```
#[must_use]
pub fn partition_for_key(key: &[u8], partition_count: u32) -> u32 {
    fnv1a_hash_bytes(key) % partition_count.max(1)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn partition_is_in_range(key in proptest::collection::vec(any::<u8>(), 0..64), count in 1u32..64) {
            prop_assert!(partition_for_key(&key, count) < count);
        }
    }

    #[test]
    fn same_key_same_partition() {
        for key in ["a", "request-42", "00000000-0000-0000-0000-000000000000"] {
            let first = partition_for_key(key.as_bytes(), DEFAULT_PARTITION_COUNT);
            for _ in 0..10 {
                assert_eq!(
                    partition_for_key(key.as_bytes(), DEFAULT_PARTITION_COUNT),
                    first
                );
            }
        }
    }

    #[test]
    fn zero_partitions_collapses_to_one() {
        assert_eq!(partition_for_key(b"anything", 0), 0);
        assert_eq!(partition_for_key(b"anything", 1), 0);
    }

    #[test]
    fn keys_spread_over_partitions() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..500 {
            let key = format!("request-{i}");
            seen.insert(partition_for_key(key.as_bytes(), DEFAULT_PARTITION_COUNT));
        }
        // 500 distinct keys should touch every one of 12 partitions.
        assert_eq!(seen.len(), DEFAULT_PARTITION_COUNT as usize);
    }
}
