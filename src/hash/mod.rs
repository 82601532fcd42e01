//! Module implement on-disk hash indexes.
//!
//! Bucket file layout:
//!
//! ```text
//! | header, start_ind bytes | hash_lim + 1 slots, u64 each | records ... |
//! ```
//!
//! Key is hashed using google's city-hash, and masked with `hash_lim` to
//! locate its slot. Slot holds the position of the first record in the
//! slot's chain, colliding keys are chained via the record's `next` field.
//! Records are appended, never moved, deleted records are marked as such
//! and dropped only by [crate::Index::compact].
//!
//! * [HashIndex], many entries per key, each entry identified by its
//!   doc-id, typically used for secondary indexes. With [Keys::Multi] a
//!   document can be indexed under several keys.
//! * [UniqueHashIndex], single entry per key, used for the `id` index.

use std::{
    ffi,
    hash::{BuildHasher, Hasher},
    sync::Arc,
};

use crate::{
    cache::{CachePolicy, CACHE_SIZE},
    db::Doc,
    index::START_IND,
    Error, Result,
};

mod buckets;
mod index;
mod record;
mod unique;

pub use buckets::{Buckets, Found};
pub use index::HashIndex;
pub use record::{Layout, Record};
pub use unique::UniqueHashIndex;

/// Default value for `hash_lim`, 64K slots.
pub const HASH_LIM: u64 = 0xFFFF;
/// Default maximum key size, in bytes.
pub const KEY_SIZE: usize = 32;
/// Default maximum doc-id size, in bytes.
pub const ID_SIZE: usize = 32;
/// Size of document revision, in bytes.
pub const REV_SIZE: usize = 8;

/// Derive `(key, value)` from a document, None if document shall not be
/// indexed.
pub type KeyFn = Arc<dyn Fn(&Doc) -> Option<(Vec<u8>, Vec<u8>)> + Send + Sync>;

/// Derive any number of `(key, value)` pairs from a document, empty if
/// document shall not be indexed.
pub type MultiKeyFn = Arc<dyn Fn(&Doc) -> Vec<(Vec<u8>, Vec<u8>)> + Send + Sync>;

/// Key derivation for secondary indexes.
#[derive(Clone)]
pub enum Keys {
    /// Atmost one key per document.
    Single(KeyFn),
    /// Any number of keys per document, like tags or words.
    Multi(MultiKeyFn),
}

impl Keys {
    pub fn is_multi(&self) -> bool {
        matches!(self, Keys::Multi(_))
    }

    /// Derive keys for document, repeated keys are dropped, first one
    /// wins.
    pub fn derive(&self, doc: &Doc) -> Vec<(Vec<u8>, Vec<u8>)> {
        match self {
            Keys::Single(key_fn) => key_fn(doc).into_iter().collect(),
            Keys::Multi(keys_fn) => {
                let mut kvs: Vec<(Vec<u8>, Vec<u8>)> = vec![];
                for (key, value) in keys_fn(doc).into_iter() {
                    if !kvs.iter().any(|(k, _)| k == &key) {
                        kvs.push((key, value));
                    }
                }
                kvs
            }
        }
    }
}

/// Configuration for hash indexes.
///
/// Configuration is used for creating an index. `hash_lim`, `key_size`
/// and `id_size` are persisted in the index header, and on re-open
/// persisted values take precedence.
#[derive(Clone, Debug)]
pub struct Config {
    /// location path where index files are created.
    pub dir: ffi::OsString,
    /// name of the index.
    pub name: String,
    /// Number of slots minus one.
    ///
    /// Default: [HASH_LIM]
    pub hash_lim: u64,
    /// Maximum key size, upto 255 bytes.
    ///
    /// Default: [KEY_SIZE]
    pub key_size: usize,
    /// Maximum doc-id size, upto 255 bytes.
    ///
    /// Default: [ID_SIZE]
    pub id_size: usize,
    /// Size of header.
    ///
    /// Default: [START_IND]
    pub start_ind: u64,
    /// Number of entries in each key cache.
    ///
    /// Default: [CACHE_SIZE]
    pub cache_size: usize,
    /// Default: [CachePolicy::Lfu]
    pub cache_policy: CachePolicy,
    /// Lock guard the key caches.
    ///
    /// Default: false
    pub cache_guard: bool,
}

impl Config {
    pub fn new(dir: &ffi::OsStr, name: &str) -> Config {
        Config {
            dir: dir.to_os_string(),
            name: name.to_string(),
            hash_lim: HASH_LIM,
            key_size: KEY_SIZE,
            id_size: ID_SIZE,
            start_ind: START_IND,
            cache_size: CACHE_SIZE,
            cache_policy: CachePolicy::default(),
            cache_guard: false,
        }
    }

    pub fn set_hash_lim(&mut self, hash_lim: u64) -> &mut Self {
        self.hash_lim = hash_lim;
        self
    }

    pub fn set_key_size(&mut self, key_size: usize) -> &mut Self {
        self.key_size = key_size;
        self
    }

    pub fn set_id_size(&mut self, id_size: usize) -> &mut Self {
        self.id_size = id_size;
        self
    }

    pub fn set_start_ind(&mut self, start_ind: u64) -> &mut Self {
        self.start_ind = start_ind;
        self
    }

    pub fn set_cache(&mut self, size: usize, policy: CachePolicy, guard: bool) -> &mut Self {
        self.cache_size = size;
        self.cache_policy = policy;
        self.cache_guard = guard;
        self
    }

    /// Same configuration under a new name.
    pub fn rename(&self, name: &str) -> Config {
        let mut config = self.clone();
        config.name = name.to_string();
        config
    }
}

/// Type uses google's city hash to convert key bytes into ``u64``.
/// Refer [cityhash_rs] for details.
#[derive(Clone, Copy, Default)]
pub struct CityHasher {
    digest: u128,
}

impl CityHasher {
    pub fn new() -> CityHasher {
        CityHasher::default()
    }
}

impl BuildHasher for CityHasher {
    type Hasher = Self;

    #[inline]
    fn build_hasher(&self) -> Self {
        *self
    }
}

impl Hasher for CityHasher {
    fn finish(&self) -> u64 {
        ((self.digest >> 64) as u64) ^ ((self.digest & 0xFFFFFFFFFFFFFFFF) as u64)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.digest = cityhash_rs::cityhash_110_128(bytes);
    }
}

/// Validate `hash_lim`, number of slots minus one, must be a power of two
/// minus one.
pub fn check_hash_lim(hash_lim: u64) -> Result<()> {
    match hash_lim.checked_add(1) {
        Some(n) if n.is_power_of_two() => Ok(()),
        _ => err_at!(Preconditions, msg: "hash_lim {:#x} not a power of two minus one", hash_lim),
    }
}

/// Hash key bytes, stable across processes and platforms.
pub fn hash_key(key: &[u8]) -> u64 {
    let mut hasher = CityHasher::new();
    hasher.write(key);
    hasher.finish()
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
