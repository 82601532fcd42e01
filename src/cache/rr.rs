use rand::{rngs::SmallRng, seq::IteratorRandom, SeedableRng};

use std::{collections::HashMap, hash::Hash};

use crate::cache::{evict_count, Cache, Cache2};

/// Random-replacement cache, `key -> value`.
///
/// No bookkeeping on hits. When full, victims are picked uniformly at
/// random.
pub struct Rr<K, V> {
    max_size: usize,
    entries: HashMap<K, V>,
    rng: SmallRng,
}

impl<K, V> Rr<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(max_size: usize) -> Rr<K, V> {
        Rr {
            max_size: std::cmp::max(max_size, 1),
            entries: HashMap::default(),
            rng: SmallRng::from_entropy(),
        }
    }

    fn evict(&mut self) {
        let n = evict_count(self.max_size);
        let victims: Vec<K> = self
            .entries
            .keys()
            .cloned()
            .choose_multiple(&mut self.rng, n);
        for key in victims.iter() {
            self.entries.remove(key);
        }
    }
}

impl<K, V> Cache<K, V> for Rr<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict()
        }
        self.entries.insert(key, value);
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

/// Random-replacement cache, `key1 -> key2 -> value`.
pub struct Rr2<K1, K2, V> {
    max_size: usize,
    cache_size: usize,
    entries: HashMap<K1, HashMap<K2, V>>,
    rng: SmallRng,
}

impl<K1, K2, V> Rr2<K1, K2, V>
where
    K1: Clone + Eq + Hash,
    K2: Clone + Eq + Hash,
{
    pub fn new(max_size: usize) -> Rr2<K1, K2, V> {
        Rr2 {
            max_size: std::cmp::max(max_size, 1),
            cache_size: 0,
            entries: HashMap::default(),
            rng: SmallRng::from_entropy(),
        }
    }

    fn evict(&mut self) {
        let n = evict_count(self.max_size);
        let victims: Vec<(K1, K2)> = self
            .entries
            .iter()
            .flat_map(|(k1, inner)| inner.keys().map(move |k2| (k1.clone(), k2.clone())))
            .choose_multiple(&mut self.rng, n);
        for (key1, key2) in victims.iter() {
            self.remove(key1, key2);
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

impl<K1, K2, V> Cache2<K1, K2, V> for Rr2<K1, K2, V>
where
    K1: Clone + Eq + Hash,
    K2: Clone + Eq + Hash,
    V: Clone,
{
    fn get(&mut self, key1: &K1, key2: &K2) -> Option<V> {
        self.entries.get(key1)?.get(key2).cloned()
    }

    fn set(&mut self, key1: K1, key2: K2, value: V) {
        if let Some(old) = self.entries.get_mut(&key1).and_then(|m| m.get_mut(&key2)) {
            *old = value;
            return;
        }

        if self.cache_size >= self.max_size {
            self.evict()
        }
        self.entries
            .entry(key1)
            .or_insert_with(HashMap::default)
            .insert(key2, value);
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
#[path = "rr_test.rs"]
mod rr_test;
