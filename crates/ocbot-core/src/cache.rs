//! Fixed-capacity recency cache.
//!
//! Bounds memory for per-key state that grows with the number of symbols,
//! bots or log keys seen under high-frequency price ticks. When full, the
//! least recently used entry is evicted.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    stamp: u64,
}

/// Least-recently-used cache with a hard capacity.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Slot<V>>,
    /// stamp -> key, oldest first.
    order: BTreeMap<u64, K>,
    next_stamp: u64,
    evictions: u64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            next_stamp: 0,
            evictions: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries evicted for capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up a value and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.touch(key)?;
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Mutable lookup; marks the entry most recently used.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.touch(key)?;
        self.entries.get_mut(key).map(|slot| &mut slot.value)
    }

    /// Look up a value without changing recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Insert or replace a value.
    ///
    /// Returns the evicted entry when the insert pushed the cache over capacity.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let stamp = self.bump();

        if let Some(slot) = self.entries.get_mut(&key) {
            self.order.remove(&slot.stamp);
            slot.stamp = stamp;
            slot.value = value;
            self.order.insert(stamp, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        self.order.insert(stamp, key.clone());
        self.entries.insert(key, Slot { value, stamp });
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.stamp);
        Some(slot.value)
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        let order = &mut self.order;
        self.entries.retain(|key, slot| {
            let kept = keep(key, &slot.value);
            if !kept {
                order.remove(&slot.stamp);
            }
            kept
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn bump(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    fn touch(&mut self, key: &K) -> Option<()> {
        let old = self.entries.get(key)?.stamp;
        let stamp = self.bump();
        self.order.remove(&old);
        self.order.insert(stamp, key.clone());
        if let Some(slot) = self.entries.get_mut(key) {
            slot.stamp = stamp;
        }
        Some(())
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        self.evictions += 1;
        Some((key, slot.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the oldest.
        assert!(cache.get(&"a").is_some());

        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert!(cache.contains_key(&"a"));
        assert!(cache.contains_key(&"c"));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.peek(&"a"), Some(&1));

        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, Some(("a", 1)));
    }

    #[test]
    fn test_replace_keeps_len() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        assert!(cache.insert("a", 10).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&"a"), Some(&10));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = BoundedCache::new(3);
        cache.insert(1u32, "x");
        cache.insert(2u32, "y");
        assert_eq!(cache.remove(&1), Some("x"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_retain_keeps_recency_order() {
        let mut cache = BoundedCache::new(3);
        cache.insert(1u32, 10);
        cache.insert(2u32, 20);
        cache.insert(3u32, 30);
        cache.retain(|_, v| *v != 20);
        assert_eq!(cache.len(), 2);

        cache.insert(4, 40);
        cache.insert(5, 50);
        // 1 was the oldest survivor.
        assert!(!cache.contains_key(&1));
        assert!(cache.contains_key(&3));
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let mut cache = BoundedCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(1, 1);
        cache.insert(2, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&2), Some(&2));
    }
}
