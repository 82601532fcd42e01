//! Module implement a single logical index over several shard indexes.
//!
//! Keys are self describing, the shard holding a key is computed from the
//! key itself via [ShardFn::calculate_shard]. New keys are allocated to
//! shards in round-robin order, via [ShardedIndex::create_key].
//!
//! Sharded index owns a bucket file holding just the header, with
//! `kind = "sharded"` and the number of shards. Each shard is a complete
//! index of its own, named `<name>-shard-NNN`.

use log::{debug, info};

use std::{ffi, fmt, ops::Bound, result};

use crate::{
    db::Doc,
    index::{Base, Cursor, Entry, Index, Params, Walk, START_IND},
    storage::{FileStorage, Storage},
    util, Error, Result,
};

/// Maximum number of shards, shard-id is encoded as two hex characters.
pub const MAX_SHARDS: usize = 255;

/// Compute the shard for a key.
pub trait ShardFn: Send {
    /// Return the shard, in `0..sh_nums`, holding `key`.
    fn calculate_shard(&self, key: &[u8], sh_nums: usize) -> Result<usize>;

    /// Create a fresh key that shall land in `shard`. None if keys cannot
    /// be generated by this sharding scheme.
    fn create_key(&self, _shard: usize) -> Option<Vec<u8>> {
        None
    }
}

/// Sharding for 32 character hex keys, typically document ids. First two
/// characters of the key is the shard id.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrefixShard;

impl ShardFn for PrefixShard {
    fn calculate_shard(&self, key: &[u8], sh_nums: usize) -> Result<usize> {
        let prefix = match key.get(..2) {
            Some(prefix) => err_at!(FailConvert, std::str::from_utf8(prefix))?,
            None => err_at!(Preconditions, msg: "key {:?} too short for shard", key)?,
        };
        let shard = err_at!(Preconditions, usize::from_str_radix(prefix, 16), "{:?}", prefix)?;
        if shard >= sh_nums {
            err_at!(Preconditions, msg: "shard {} out of {} shards", shard, sh_nums)
        } else {
            Ok(shard)
        }
    }

    fn create_key(&self, shard: usize) -> Option<Vec<u8>> {
        let mut key = util::random_hex_32().into_bytes();
        key[..2].copy_from_slice(format!("{:02x}", shard).as_bytes());
        Some(key)
    }
}

#[derive(Clone)]
struct ShardName(String);

impl From<(String, usize)> for ShardName {
    fn from((s, shard_i): (String, usize)) -> ShardName {
        ShardName(format!("{}-shard-{:03}", s, shard_i))
    }
}

impl fmt::Display for ShardName {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

/// Index made up of `sh_nums` shard indexes.
pub struct ShardedIndex<S> {
    base: Base,
    shard_fn: S,
    shards: Vec<Box<dyn Index>>,
    last_used: usize,
}

impl<S> ShardedIndex<S>
where
    S: ShardFn,
{
    /// Create a sharded index of `sh_nums` shards. `factory` is called
    /// with `(dir, shard_name)` for each shard.
    pub fn new<F>(
        dir: &ffi::OsStr,
        name: &str,
        sh_nums: usize,
        shard_fn: S,
        mut factory: F,
    ) -> Result<ShardedIndex<S>>
    where
        F: FnMut(&ffi::OsStr, &str) -> Result<Box<dyn Index>>,
    {
        if sh_nums == 0 || sh_nums > MAX_SHARDS {
            err_at!(Preconditions, msg: "sh_nums {} out of range 1..={}", sh_nums, MAX_SHARDS)?
        }

        let mut shards = vec![];
        for shard_i in 0..sh_nums {
            let shard_name: ShardName = (name.to_string(), shard_i).into();
            shards.push(factory(dir, &shard_name.to_string())?);
        }

        let mut params = Params::new(name, "sharded");
        params.shards = sh_nums as u64;
        let storage = Box::new(FileStorage::new(dir, name));
        let base = Base::new(dir, params, START_IND, storage);

        debug!(target: "bucketdb", "{:?}, new sharded index with {} shards", name, sh_nums);

        Ok(ShardedIndex {
            base,
            shard_fn,
            shards,
            last_used: 0,
        })
    }

    pub fn to_sh_nums(&self) -> usize {
        self.shards.len()
    }

    /// Return the shard that was used last, an allocation hint.
    pub fn to_last_used(&self) -> usize {
        self.last_used
    }

    /// Return the shard holding `key`.
    pub fn to_shard(&self, key: &[u8]) -> Result<usize> {
        self.shard_fn.calculate_shard(key, self.shards.len())
    }

    /// Return names of shard indexes, in shard order.
    pub fn to_shard_names(&self) -> Vec<String> {
        self.shards.iter().map(|s| s.to_name()).collect()
    }

    /// Take `walk` through every shard in shard order, `cursor.shard` is
    /// the shard being scanned.
    fn walk_shards(&mut self, walk: &Walk, cursor: &mut Cursor) -> Result<Option<Entry>> {
        while cursor.shard < self.shards.len() {
            if let Some(entry) = walk.step(self.shards[cursor.shard].as_mut(), cursor)? {
                return Ok(Some(entry));
            }
            if cursor.limit > 0 && cursor.taken >= cursor.limit {
                return Ok(None);
            }
            cursor.done = false;
            cursor.next_shard();
        }
        cursor.done = true;
        Ok(None)
    }

    fn for_each_shard<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Box<dyn Index>) -> Result<()>,
    {
        let mut res = Ok(());
        for shard in self.shards.iter_mut() {
            if let Err(err) = f(shard) {
                if res.is_ok() {
                    res = Err(err);
                }
            }
        }
        res
    }
}

impl<S> Index for ShardedIndex<S>
where
    S: ShardFn,
{
    fn to_name(&self) -> String {
        self.base.to_name()
    }

    fn to_params(&self) -> Params {
        self.base.as_params().clone()
    }

    fn create_index(&mut self) -> Result<()> {
        self.base.create_file(0)?;
        for shard in self.shards.iter_mut() {
            shard.create_index()?;
        }

        info!(target: "bucketdb", "{:?}, created {} shards", self.to_name(), self.shards.len());
        Ok(())
    }

    fn open_index(&mut self) -> Result<()> {
        self.base.open_file()?;
        let n = self.base.as_params().shards;
        if n != (self.shards.len() as u64) {
            err_at!(Preconditions, msg: "persisted {} shards != {}", n, self.shards.len())?
        }
        for shard in self.shards.iter_mut() {
            shard.open_index()?;
        }
        Ok(())
    }

    fn close_index(&mut self) -> Result<()> {
        let res = self.for_each_shard(|shard| shard.close_index());
        self.base.close()?;
        res
    }

    fn destroy(&mut self) -> Result<()> {
        let res = self.for_each_shard(|shard| shard.destroy());
        self.base.destroy()?;
        res
    }

    fn flush(&mut self) {
        self.shards.iter_mut().for_each(|shard| shard.flush());
        self.base.flush()
    }

    fn fsync(&mut self) {
        self.shards.iter_mut().for_each(|shard| shard.fsync());
        self.base.fsync()
    }

    fn compact(&mut self) -> Result<()> {
        for shard in self.shards.iter_mut() {
            shard.compact()?;
        }
        Ok(())
    }

    /// Rehash every shard to `hash_lim`.
    fn rehash(&mut self, hash_lim: u64) -> Result<()> {
        for shard in self.shards.iter_mut() {
            shard.rehash(hash_lim)?;
        }
        Ok(())
    }

    fn save_params(&mut self, f: &mut dyn FnMut(&mut Params)) -> Result<()> {
        self.base.save_params(f)
    }

    fn insert(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()> {
        let shard = self.to_shard(key)?;
        self.last_used = shard;
        self.shards[shard].insert(key, doc_id, start, size)
    }

    fn update(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()> {
        let shard = self.to_shard(key)?;
        self.last_used = shard;
        self.shards[shard].update(key, doc_id, start, size)
    }

    fn get(&mut self, key: &[u8]) -> Result<Entry> {
        let shard = self.to_shard(key)?;
        self.last_used = shard;
        self.shards[shard].get(key)
    }

    fn delete(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()> {
        let shard = self.to_shard(key)?;
        self.shards[shard].delete(key, doc_id, start, size)
    }

    fn next_all(&mut self, cursor: &mut Cursor) -> Result<Option<Entry>> {
        self.walk_shards(&Walk::All, cursor)
    }

    fn next_many(&mut self, key: &[u8], cursor: &mut Cursor) -> Result<Option<Entry>> {
        let shard = self.to_shard(key)?;
        self.shards[shard].next_many(key, cursor)
    }

    /// Keys are ordered within each shard, not across shards.
    fn next_between(
        &mut self,
        low: Bound<&[u8]>,
        high: Bound<&[u8]>,
        cursor: &mut Cursor,
    ) -> Result<Option<Entry>> {
        self.walk_shards(&Walk::range(low, high), cursor)
    }

    fn make_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        let shard = self.to_shard(key)?;
        self.shards[shard].make_key(key)
    }

    fn make_key_value(&self, doc: &Doc) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        match self.shards.first() {
            Some(shard) => shard.make_key_value(doc),
            None => err_at!(Fatal, msg: "{:?} without shards", self.to_name()),
        }
    }

    fn make_keys_values(&self, doc: &Doc) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        match self.shards.first() {
            Some(shard) => shard.make_keys_values(doc),
            None => err_at!(Fatal, msg: "{:?} without shards", self.to_name()),
        }
    }

    /// Allocate a key in the shard next to the last used one.
    fn create_key(&mut self) -> Result<Vec<u8>> {
        let shard = (self.last_used + 1) % self.shards.len();
        match self.shard_fn.create_key(shard) {
            Some(key) => {
                self.last_used = shard;
                Ok(key)
            }
            None => err_at!(NotImplemented, msg: "{:?} cannot create keys", self.to_name()),
        }
    }

    fn storage(&mut self) -> Result<&mut dyn Storage> {
        match self.shards.first_mut() {
            Some(shard) => shard.storage(),
            None => err_at!(Fatal, msg: "sharded index without shards"),
        }
    }

    fn shard_storage(&mut self, key: &[u8]) -> Result<&mut dyn Storage> {
        let shard = self.to_shard(key)?;
        self.shards[shard].storage()
    }

    fn clear_cache(&mut self) {
        self.shards.iter_mut().for_each(|shard| shard.clear_cache())
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
