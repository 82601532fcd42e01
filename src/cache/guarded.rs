use log::debug;
use parking_lot::Mutex;

use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

use crate::{
    cache::{Cache, Cache2},
    Result,
};

/// Lock guarded cache, share a single [Cache] or [Cache2] between
/// threads.
///
/// The lock is held while looking up and while filling the cache, but
/// never while computing the missing value. Two threads missing the same
/// key may both compute, last fill wins.
pub struct Guarded<C> {
    inner: Mutex<C>,
    races: AtomicUsize,
}

impl<C> Guarded<C> {
    pub fn new(cache: C) -> Guarded<C> {
        Guarded {
            inner: Mutex::new(cache),
            races: AtomicUsize::new(0),
        }
    }

    /// Unwrap the underlying cache.
    pub fn into_inner(self) -> C {
        self.inner.into_inner()
    }

    /// Number of fills that found the key already filled by another
    /// thread. Only counted with `debug` feature.
    pub fn to_races(&self) -> usize {
        self.races.load(SeqCst)
    }

    /// Return cached value for `key`, else compute it using `f`, without
    /// holding the lock, and fill the cache.
    pub fn get_or_compute<K, V, F>(&self, key: K, f: F) -> Result<V>
    where
        C: Cache<K, V>,
        V: Clone,
        F: FnOnce(&K) -> Result<V>,
    {
        if let Some(value) = self.inner.lock().get(&key) {
            return Ok(value);
        }

        let value = f(&key)?;

        let mut cache = self.inner.lock();
        if cfg!(feature = "debug") && cache.get(&key).is_some() {
            self.races.fetch_add(1, SeqCst);
            debug!(target: "bucketdb", "lost fill race");
        }
        cache.set(key, value.clone());

        Ok(value)
    }

    /// Same as [Guarded::get_or_compute] for two level caches.
    pub fn get_or_compute2<K1, K2, V, F>(&self, key1: K1, key2: K2, f: F) -> Result<V>
    where
        C: Cache2<K1, K2, V>,
        V: Clone,
        F: FnOnce(&K1, &K2) -> Result<V>,
    {
        if let Some(value) = self.inner.lock().get(&key1, &key2) {
            return Ok(value);
        }

        let value = f(&key1, &key2)?;

        let mut cache = self.inner.lock();
        if cfg!(feature = "debug") && cache.get(&key1, &key2).is_some() {
            self.races.fetch_add(1, SeqCst);
            debug!(target: "bucketdb", "lost fill race");
        }
        cache.set(key1, key2, value.clone());

        Ok(value)
    }
}

impl<K, V, C> Cache<K, V> for Guarded<C>
where
    C: Cache<K, V>,
{
    fn get(&mut self, key: &K) -> Option<V> {
        self.inner.lock().get(key)
    }

    fn set(&mut self, key: K, value: V) {
        self.inner.lock().set(key, value)
    }

    fn delete(&mut self, key: &K) -> bool {
        self.inner.lock().delete(key)
    }

    fn clear(&mut self) {
        self.inner.lock().clear()
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn to_max_size(&self) -> usize {
        self.inner.lock().to_max_size()
    }
}

impl<K1, K2, V, C> Cache2<K1, K2, V> for Guarded<C>
where
    C: Cache2<K1, K2, V>,
{
    fn get(&mut self, key1: &K1, key2: &K2) -> Option<V> {
        self.inner.lock().get(key1, key2)
    }

    fn set(&mut self, key1: K1, key2: K2, value: V) {
        self.inner.lock().set(key1, key2, value)
    }

    fn delete(&mut self, key1: &K1) -> bool {
        self.inner.lock().delete(key1)
    }

    fn delete2(&mut self, key1: &K1, key2: &K2) -> bool {
        self.inner.lock().delete2(key1, key2)
    }

    fn clear(&mut self) {
        self.inner.lock().clear()
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn to_max_size(&self) -> usize {
        self.inner.lock().to_max_size()
    }
}

#[cfg(test)]
#[path = "guarded_test.rs"]
mod guarded_test;
