use serde::Deserialize;

use std::{ffi, fs, path};

use crate::{
    cache::{CachePolicy, CACHE_SIZE},
    hash::{self, HASH_LIM},
    index::START_IND,
    Error, Result,
};

/// Configuration for [crate::db::Database].
///
/// Configuration can be composed programmatically, using the `set_*`
/// methods, or loaded from a TOML file using [Config::from_toml].
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory where database files are kept.
    pub dir: ffi::OsString,
    /// Number of shards for the `id` index, `1` for an unsharded index.
    ///
    /// Default: 1
    pub id_shards: usize,
    /// Default: [HASH_LIM]
    pub hash_lim: u64,
    /// Default: [START_IND]
    pub start_ind: u64,
    /// Default: [CACHE_SIZE]
    pub cache_size: usize,
    /// Default: [CachePolicy::Lfu]
    pub cache_policy: CachePolicy,
    /// Lock guard index caches.
    ///
    /// Default: false
    pub cache_guard: bool,
}

impl Config {
    pub fn new(dir: &ffi::OsStr) -> Config {
        Config {
            dir: dir.to_os_string(),
            id_shards: 1,
            hash_lim: HASH_LIM,
            start_ind: START_IND,
            cache_size: CACHE_SIZE,
            cache_policy: CachePolicy::default(),
            cache_guard: false,
        }
    }

    /// Load configuration from TOML file, missing settings fall back to
    /// their defaults. `dir` in file, if present, overrides `dir`.
    pub fn from_toml<P>(dir: &ffi::OsStr, loc: P) -> Result<Config>
    where
        P: AsRef<path::Path>,
    {
        let loc = loc.as_ref();
        let text = err_at!(IOError, fs::read_to_string(loc), "{:?}", loc)?;
        let cfg: TomlConfig = err_at!(InvalidFile, toml::from_str(&text), "{:?}", loc)?;
        cfg.into_config(dir)
    }

    pub fn set_id_shards(&mut self, id_shards: usize) -> &mut Self {
        self.id_shards = id_shards;
        self
    }

    pub fn set_hash_lim(&mut self, hash_lim: u64) -> &mut Self {
        self.hash_lim = hash_lim;
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

    /// Hash index configuration for index `name`, under this database.
    pub fn to_hash_config(&self, name: &str) -> hash::Config {
        let mut config = hash::Config::new(&self.dir, name);
        config
            .set_hash_lim(self.hash_lim)
            .set_start_ind(self.start_ind)
            .set_cache(self.cache_size, self.cache_policy, self.cache_guard);
        config
    }
}

#[derive(Clone, Deserialize)]
pub struct TomlConfig {
    dir: Option<path::PathBuf>,
    id_shards: Option<usize>,
    hash_lim: Option<u64>,
    start_ind: Option<u64>,
    cache: Option<TomlCache>,
}

#[derive(Clone, Deserialize)]
pub struct TomlCache {
    size: Option<usize>,
    policy: Option<String>,
    guard: Option<bool>,
}

impl TomlConfig {
    fn into_config(self, dir: &ffi::OsStr) -> Result<Config> {
        let mut config = match self.dir {
            Some(dir) => Config::new(dir.as_os_str()),
            None => Config::new(dir),
        };

        config.id_shards = self.id_shards.unwrap_or(config.id_shards);
        config.hash_lim = self.hash_lim.unwrap_or(config.hash_lim);
        config.start_ind = self.start_ind.unwrap_or(config.start_ind);
        if let Some(cache) = self.cache {
            config.cache_size = cache.size.unwrap_or(config.cache_size);
            config.cache_policy = match cache.policy {
                Some(policy) => policy.parse()?,
                None => config.cache_policy,
            };
            config.cache_guard = cache.guard.unwrap_or(config.cache_guard);
        }

        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
