use std::collections::BTreeMap;

/// A mapping from epoch number to a value, retaining only the `K` entries
/// with the highest epoch number. Sized so analyses at epoch `E` can look
/// back at snapshots from `E`, `E-1` or `E-2` without the cache growing
/// across a long-running process.
pub struct BoundedEpochCache<V> {
    capacity: usize,
    entries: BTreeMap<u64, V>,
}

impl<V> BoundedEpochCache<V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "a zero-capacity cache can never retain anything");
        Self {
            capacity,
            entries: BTreeMap::new(),
        }
    }

    /// Inserts `value` under `epoch`, then evicts the oldest (smallest) keys
    /// beyond the retention limit.
    pub fn insert(&mut self, epoch: u64, value: V) {
        self.entries.insert(epoch, value);
        while self.entries.len() > self.capacity {
            if let Some((&oldest, _)) = self.entries.iter().next() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn get(&self, epoch: u64) -> Option<&V> {
        self.entries.get(&epoch)
    }

    pub fn contains(&self, epoch: u64) -> bool {
        self.entries.contains_key(&epoch)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `epoch`, falling back to each epoch in `fallbacks` in order.
    /// Used by analyses (e.g. the rewards comparator) whose preferred
    /// snapshot epoch may not yet be cached.
    pub fn get_with_fallback(&self, epoch: u64, fallbacks: &[u64]) -> Option<&V> {
        self.get(epoch)
            .or_else(|| fallbacks.iter().find_map(|e| self.get(*e)))
    }
}

/// The depth every call site in this crate constructs its `BoundedEpochCache`
/// with: analyses look back at most two epochs from the current one.
pub const EPOCH_CACHE_DEPTH: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_cache_keeps_only_the_k_largest_keys() {
        // Spec §8 scenario 3.
        let mut cache = BoundedEpochCache::new(3);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");
        cache.insert(4, "d");

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));
        assert!(cache.contains(4));
    }

    #[test]
    fn fallback_walks_the_provided_list_in_order() {
        let mut cache = BoundedEpochCache::new(3);
        cache.insert(5, "earlier");
        assert_eq!(cache.get_with_fallback(7, &[6, 5]), Some(&"earlier"));
        assert_eq!(cache.get_with_fallback(7, &[6, 2]), None);
    }
}
