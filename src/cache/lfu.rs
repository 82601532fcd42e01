use std::{collections::HashMap, hash::Hash};

use crate::cache::{evict_count, lowest_n, Cache, Cache2};

/// Least-frequently-used cache, `key -> value`.
///
/// Each entry carries a use-count, incremented on every hit. When full,
/// entries with the lowest use-count are evicted.
pub struct Lfu<K, V> {
    max_size: usize,
    entries: HashMap<K, (V, u64)>,
}

impl<K, V> Lfu<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Create a new cache holding upto `max_size` entries, `max_size`
    /// must be greater than ZERO.
    pub fn new(max_size: usize) -> Lfu<K, V> {
        Lfu {
            max_size: std::cmp::max(max_size, 1),
            entries: HashMap::default(),
        }
    }

    /// Return the use-count for `key`, without counting it as a hit.
    pub fn to_use_count(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|(_, count)| *count)
    }

    fn evict(&mut self) {
        let n = evict_count(self.max_size);
        let iter = self.entries.iter().map(|(k, (_, c))| (*c, k.clone()));
        for key in lowest_n(iter, n).into_iter() {
            self.entries.remove(&key);
        }
    }
}

impl<K, V> Cache<K, V> for Lfu<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get_mut(key) {
            Some((value, count)) => {
                *count += 1;
                Some(value.clone())
            }
            None => None,
        }
    }

    fn set(&mut self, key: K, value: V) {
        match self.entries.get_mut(&key) {
            Some(entry) => entry.0 = value,
            None => {
                if self.entries.len() >= self.max_size {
                    self.evict()
                }
                self.entries.insert(key, (value, 1));
            }
        }
    }

    fn delete(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    fn clear(&mut self) {
        self.entries.clear()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn to_max_size(&self) -> usize {
        self.max_size
    }
}

/// Least-frequently-used cache, `key1 -> key2 -> value`.
pub struct Lfu2<K1, K2, V> {
    max_size: usize,
    cache_size: usize,
    entries: HashMap<K1, HashMap<K2, (V, u64)>>,
}

impl<K1, K2, V> Lfu2<K1, K2, V>
where
    K1: Clone + Eq + Hash,
    K2: Clone + Eq + Hash,
{
    pub fn new(max_size: usize) -> Lfu2<K1, K2, V> {
        Lfu2 {
            max_size: std::cmp::max(max_size, 1),
            cache_size: 0,
            entries: HashMap::default(),
        }
    }

    pub fn to_use_count(&self, key1: &K1, key2: &K2) -> Option<u64> {
        let (_, count) = self.entries.get(key1)?.get(key2)?;
        Some(*count)
    }

    fn evict(&mut self) {
        let n = evict_count(self.max_size);
        let iter = self.entries.iter().flat_map(|(k1, inner)| {
            inner
                .iter()
                .map(move |(k2, (_, c))| (*c, (k1.clone(), k2.clone())))
        });
        for (key1, key2) in lowest_n(iter, n).into_iter() {
            self.remove(&key1, &key2);
        }
    }

    fn remove(&mut self, key1: &K1, key2: &K2) -> bool {
        let (ok, empty) = match self.entries.get_mut(key1) {
            Some(inner) => (inner.remove(key2).is_some(), inner.is_empty()),
            None => (false, false),
        };
        if empty {
            self.entries.remove(key1);
        }
        if ok {
            self.cache_size -= 1;
        }
        ok
    }
}

impl<K1, K2, V> Cache2<K1, K2, V> for Lfu2<K1, K2, V>
where
    K1: Clone + Eq + Hash,
    K2: Clone + Eq + Hash,
    V: Clone,
{
    fn get(&mut self, key1: &K1, key2: &K2) -> Option<V> {
        match self.entries.get_mut(key1)?.get_mut(key2) {
            Some((value, count)) => {
                *count += 1;
                Some(value.clone())
            }
            None => None,
        }
    }

    fn set(&mut self, key1: K1, key2: K2, value: V) {
        if let Some(entry) = self.entries.get_mut(&key1).and_then(|m| m.get_mut(&key2)) {
            entry.0 = value;
            return;
        }

        if self.cache_size >= self.max_size {
            self.evict()
        }
        self.entries
            .entry(key1)
            .or_insert_with(HashMap::default)
            .insert(key2, (value, 1));
        self.cache_size += 1;
    }

    fn delete(&mut self, key1: &K1) -> bool {
        match self.entries.remove(key1) {
            Some(inner) => {
                self.cache_size -= inner.len();
                true
            }
            None => false,
        }
    }

    fn delete2(&mut self, key1: &K1, key2: &K2) -> bool {
        self.remove(key1, key2)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.cache_size = 0;
    }

    fn len(&self) -> usize {
        self.cache_size
    }

    fn to_max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
#[path = "lfu_test.rs"]
mod lfu_test;
