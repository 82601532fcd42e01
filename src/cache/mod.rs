//! Module implement bounded memoization caches, used by indexes to avoid
//! repeated lookups on disk.
//!
//! Two eviction policies are available:
//!
//! * [Lfu], least-frequently-used. Every hit increments the entry's
//!   use-count, and eviction removes entries with the lowest use-count.
//! * [Rr], random-replacement. Cheaper, no use-count bookkeeping, and
//!   eviction removes entries picked uniformly at random.
//!
//! Both come in a single-level, `key -> value`, flavour and a two-level,
//! `key1 -> key2 -> value`, flavour. Two-level caches can drop every
//! `key2` under a `key1` in one call.
//!
//! **Eviction**
//!
//! When a cache holding `max_size` entries receives a new entry, exactly
//! `max(max_size / 10, 1)` entries are evicted _before_ the new entry is
//! inserted. Hence the cache never holds more than `max_size` entries
//! once a call returns.
//!
//! Plain caches need `&mut self` for every access. Wrap them with
//! [Guarded] to share a cache between threads.

use std::hash::Hash;

use crate::{Error, Result};

mod guarded;
mod lfu;
mod rr;

pub use guarded::Guarded;
pub use lfu::{Lfu, Lfu2};
pub use rr::{Rr, Rr2};

/// Default number of entries held by an index cache.
pub const CACHE_SIZE: usize = 100;

/// Eviction policy for index caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    Lfu,
    Rr,
}

impl Default for CachePolicy {
    fn default() -> CachePolicy {
        CachePolicy::Lfu
    }
}

impl std::str::FromStr for CachePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<CachePolicy> {
        match s {
            "lfu" => Ok(CachePolicy::Lfu),
            "rr" => Ok(CachePolicy::Rr),
            _ => err_at!(InvalidInput, msg: "invalid cache policy {:?}", s),
        }
    }
}

/// Single level cache.
pub trait Cache<K, V> {
    /// Return a clone of the cached value, if present. Counts as a hit.
    fn get(&mut self, key: &K) -> Option<V>;

    /// Insert `value` for `key`. If cache is full, evict before inserting.
    fn set(&mut self, key: K, value: V);

    /// Remove `key` from cache, return whether it was present.
    fn delete(&mut self, key: &K) -> bool;

    /// Empty the cache.
    fn clear(&mut self);

    /// Return the number of cached entries.
    fn len(&self) -> usize;

    /// Return the maximum number of cached entries.
    fn to_max_size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return cached value for key, else compute it using `f` and cache
    /// the result. Errors from `f` are returned as is and nothing is
    /// cached.
    fn get_or_compute<F>(&mut self, key: K, f: F) -> Result<V>
    where
        Self: Sized,
        V: Clone,
        F: FnOnce(&K) -> Result<V>,
    {
        match self.get(&key) {
            Some(value) => Ok(value),
            None => {
                let value = f(&key)?;
                self.set(key, value.clone());
                Ok(value)
            }
        }
    }
}

/// Two level cache, `key1 -> key2 -> value`.
pub trait Cache2<K1, K2, V> {
    /// Return a clone of the cached value, if present. Counts as a hit.
    fn get(&mut self, key1: &K1, key2: &K2) -> Option<V>;

    /// Insert `value` for `(key1, key2)`. If cache is full, evict before
    /// inserting.
    fn set(&mut self, key1: K1, key2: K2, value: V);

    /// Remove every entry under `key1`, return whether any was present.
    fn delete(&mut self, key1: &K1) -> bool;

    /// Remove a single entry, return whether it was present.
    fn delete2(&mut self, key1: &K1, key2: &K2) -> bool;

    /// Empty the cache.
    fn clear(&mut self);

    /// Return the number of cached `(key1, key2)` entries.
    fn len(&self) -> usize;

    /// Return the maximum number of cached entries.
    fn to_max_size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same as [Cache::get_or_compute] for two level caches.
    fn get_or_compute<F>(&mut self, key1: K1, key2: K2, f: F) -> Result<V>
    where
        Self: Sized,
        V: Clone,
        F: FnOnce(&K1, &K2) -> Result<V>,
    {
        match self.get(&key1, &key2) {
            Some(value) => Ok(value),
            None => {
                let value = f(&key1, &key2)?;
                self.set(key1, key2, value.clone());
                Ok(value)
            }
        }
    }
}

impl<K, V, C> Cache<K, V> for Box<C>
where
    C: Cache<K, V> + ?Sized,
{
    fn get(&mut self, key: &K) -> Option<V> {
        self.as_mut().get(key)
    }

    fn set(&mut self, key: K, value: V) {
        self.as_mut().set(key, value)
    }

    fn delete(&mut self, key: &K) -> bool {
        self.as_mut().delete(key)
    }

    fn clear(&mut self) {
        self.as_mut().clear()
    }

    fn len(&self) -> usize {
        self.as_ref().len()
    }

    fn to_max_size(&self) -> usize {
        self.as_ref().to_max_size()
    }
}

impl<K1, K2, V, C> Cache2<K1, K2, V> for Box<C>
where
    C: Cache2<K1, K2, V> + ?Sized,
{
    fn get(&mut self, key1: &K1, key2: &K2) -> Option<V> {
        self.as_mut().get(key1, key2)
    }

    fn set(&mut self, key1: K1, key2: K2, value: V) {
        self.as_mut().set(key1, key2, value)
    }

    fn delete(&mut self, key1: &K1) -> bool {
        self.as_mut().delete(key1)
    }

    fn delete2(&mut self, key1: &K1, key2: &K2) -> bool {
        self.as_mut().delete2(key1, key2)
    }

    fn clear(&mut self) {
        self.as_mut().clear()
    }

    fn len(&self) -> usize {
        self.as_ref().len()
    }

    fn to_max_size(&self) -> usize {
        self.as_ref().to_max_size()
    }
}

/// Single level key cache, as held by indexes.
pub type KeyCache<K, V> = Box<dyn Cache<K, V> + Send>;

/// Two level key cache, as held by indexes.
pub type KeyCache2<K1, K2, V> = Box<dyn Cache2<K1, K2, V> + Send>;

/// Build a single level cache for `policy`, optionally guarded.
pub fn new_cache<K, V>(policy: CachePolicy, max_size: usize, guard: bool) -> KeyCache<K, V>
where
    K: 'static + Send + Clone + Eq + Hash,
    V: 'static + Send + Clone,
{
    match (policy, guard) {
        (CachePolicy::Lfu, false) => Box::new(Lfu::new(max_size)),
        (CachePolicy::Rr, false) => Box::new(Rr::new(max_size)),
        (CachePolicy::Lfu, true) => Box::new(Guarded::new(Lfu::new(max_size))),
        (CachePolicy::Rr, true) => Box::new(Guarded::new(Rr::new(max_size))),
    }
}

/// Build a two level cache for `policy`, optionally guarded.
pub fn new_cache2<K1, K2, V>(
    policy: CachePolicy,
    max_size: usize,
    guard: bool,
) -> KeyCache2<K1, K2, V>
where
    K1: 'static + Send + Clone + Eq + Hash,
    K2: 'static + Send + Clone + Eq + Hash,
    V: 'static + Send + Clone,
{
    match (policy, guard) {
        (CachePolicy::Lfu, false) => Box::new(Lfu2::new(max_size)),
        (CachePolicy::Rr, false) => Box::new(Rr2::new(max_size)),
        (CachePolicy::Lfu, true) => Box::new(Guarded::new(Lfu2::new(max_size))),
        (CachePolicy::Rr, true) => Box::new(Guarded::new(Rr2::new(max_size))),
    }
}

/// Number of entries to evict from a full cache.
#[inline]
pub fn evict_count(max_size: usize) -> usize {
    std::cmp::max(max_size / 10, 1)
}

// pick `n` items with lowest use-count, ties broken by iteration order.
fn lowest_n<K, I>(items: I, n: usize) -> Vec<K>
where
    I: Iterator<Item = (u64, K)>,
{
    let mut items: Vec<(u64, K)> = items.collect();
    if n < items.len() {
        items.select_nth_unstable_by_key(n, |(count, _)| *count);
        items.truncate(n);
    }
    items.into_iter().map(|(_, key)| key).collect()
}
