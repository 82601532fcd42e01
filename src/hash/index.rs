use log::debug;

use crate::{
    cache::{self, Cache, Cache2, KeyCache, KeyCache2},
    db::Doc,
    hash::{Buckets, Config, Found, KeyFn, Keys, Record},
    index::{files::to_compact_name, Cursor, Entry, Index, Params, Status},
    storage::{FileStorage, Storage},
    Error, Result,
};

/// Hash index, many entries per key.
///
/// Entries under the same key are told apart by their doc-id. Lookups by
/// key are memoized in a key cache, and record positions by `(key,
/// doc_id)` in a second level cache.
///
/// Created with [Keys::Multi], a document is indexed under every key
/// derived from it, and the index kind is `"multi_hash"`.
pub struct HashIndex {
    config: Config,
    keys: Keys,
    buckets: Buckets,
    find_key: KeyCache<Vec<u8>, Entry>,
    locate: KeyCache2<Vec<u8>, Vec<u8>, u64>,
}

impl HashIndex {
    /// Create a hash index instance, with file storage. Call
    /// [Index::create_index] or [Index::open_index] before using it.
    pub fn new(config: &Config, key_fn: KeyFn) -> Result<HashIndex> {
        HashIndex::with_keys(config, Keys::Single(key_fn))
    }

    pub fn with_keys(config: &Config, keys: Keys) -> Result<HashIndex> {
        let storage = Box::new(FileStorage::new(&config.dir, &config.name));
        HashIndex::with_storage(config, keys, storage)
    }

    pub fn with_storage(
        config: &Config,
        keys: Keys,
        storage: Box<dyn Storage>,
    ) -> Result<HashIndex> {
        let kind = if keys.is_multi() { "multi_hash" } else { "hash" };
        let (size, policy, guard) = (config.cache_size, config.cache_policy, config.cache_guard);
        let val = HashIndex {
            config: config.clone(),
            keys,
            buckets: Buckets::new(config, kind, storage)?,
            find_key: cache::new_cache(policy, size, guard),
            locate: cache::new_cache2(policy, size, guard),
        };
        Ok(val)
    }

    /// Return position of the record for `(key, doc_id)`.
    fn locate(&mut self, key: &[u8], doc_id: &[u8]) -> Result<u64> {
        let buckets = &mut self.buckets;
        self.locate
            .get_or_compute(key.to_vec(), doc_id.to_vec(), |key, doc_id| {
                match buckets.find(key, |r| &r.key == key && &r.doc_id == doc_id)? {
                    Found::Hit(pos, _) => Ok(pos),
                    Found::Empty => err_at!(KeyNotFound, msg: "key {:?}", key),
                    Found::Miss(_, _) => err_at!(DocIdNotFound, msg: "doc_id {:?}", doc_id),
                }
            })
    }

    /// Compact into a scratch index, with `hash_lim` slots if supplied,
    /// else with the persisted number of slots.
    fn compact_with(&mut self, hash_lim: Option<u64>) -> Result<()> {
        let name = self.to_name();
        let layout = *self.buckets.as_layout();
        let mut config = self.config.rename(&to_compact_name(&name));
        config
            .set_hash_lim(hash_lim.unwrap_or_else(|| self.buckets.to_hash_lim()))
            .set_key_size(layout.key_size)
            .set_id_size(layout.id_size);

        let mut other = HashIndex::with_keys(&config, self.keys.clone())?;
        let n = self.buckets.compact_into(&mut other)?;
        self.clear_cache();

        debug!(
            target: "bucketdb",
            "{:?}, compacted {} entries into {:#x} slots", name, n, self.buckets.to_hash_lim()
        );
        Ok(())
    }

    fn invalidate(&mut self, key: &[u8], doc_id: &[u8]) {
        let key = key.to_vec();
        self.find_key.delete(&key);
        self.locate.delete2(&key, &doc_id.to_vec());
    }
}

impl Index for HashIndex {
    fn to_name(&self) -> String {
        self.buckets.base.to_name()
    }

    fn to_params(&self) -> Params {
        self.buckets.base.as_params().clone()
    }

    fn create_index(&mut self) -> Result<()> {
        self.buckets.create()
    }

    fn open_index(&mut self) -> Result<()> {
        self.buckets.open()
    }

    fn close_index(&mut self) -> Result<()> {
        self.clear_cache();
        self.buckets.base.close()
    }

    fn destroy(&mut self) -> Result<()> {
        self.clear_cache();
        self.buckets.base.destroy()
    }

    fn flush(&mut self) {
        self.buckets.base.flush()
    }

    fn fsync(&mut self) {
        self.buckets.base.fsync()
    }

    fn compact(&mut self) -> Result<()> {
        self.compact_with(None)
    }

    fn rehash(&mut self, hash_lim: u64) -> Result<()> {
        self.compact_with(Some(hash_lim))
    }

    fn save_params(&mut self, f: &mut dyn FnMut(&mut Params)) -> Result<()> {
        self.buckets.base.save_params(f)
    }

    fn insert(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()> {
        self.buckets.as_layout().check_key(key)?;
        self.buckets.as_layout().check_doc_id(doc_id)?;

        let found = self
            .buckets
            .find(key, |r| r.key == key && r.doc_id == doc_id)?;
        let r = Record::new(key, doc_id, start, size, 0);
        match found {
            Found::Hit(pos, old) => {
                let r = Record { next: old.next, ..r };
                self.buckets.write_record(pos, &r)?;
            }
            Found::Miss(pos, tail) => {
                self.buckets.link_record(&r, Some((pos, tail)))?;
            }
            Found::Empty => {
                self.buckets.link_record(&r, None)?;
            }
        }

        self.invalidate(key, doc_id);
        Ok(())
    }

    fn update(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()> {
        let pos = self.locate(key, doc_id)?;
        let old = self.buckets.read_record(pos)?;
        let r = Record {
            start,
            size,
            status: Status::Ok,
            ..old
        };
        self.buckets.write_record(pos, &r)?;

        self.invalidate(key, doc_id);
        Ok(())
    }

    fn get(&mut self, key: &[u8]) -> Result<Entry> {
        let buckets = &mut self.buckets;
        self.find_key.get_or_compute(key.to_vec(), |key| {
            match buckets.find(key, |r| &r.key == key && r.is_live())? {
                Found::Hit(_, r) => Ok(r.to_entry()),
                _ => err_at!(KeyNotFound, msg: "key {:?}", key),
            }
        })
    }

    /// Mark entry as deleted. Entry is identified by `doc_id`, or by
    /// `(start, size)` if `doc_id` is empty.
    fn delete(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()> {
        let found = match doc_id.is_empty() {
            true => self.buckets.find(key, |r| {
                r.key == key && r.is_live() && (r.start, r.size) == (start, size)
            })?,
            false => match self.locate(key, doc_id) {
                Ok(pos) => Found::Hit(pos, self.buckets.read_record(pos)?),
                Err(Error::KeyNotFound(_, _)) => Found::Empty,
                Err(err) => return Err(err),
            },
        };

        match found {
            Found::Hit(pos, old) => {
                let r = Record {
                    status: Status::Deleted,
                    ..old
                };
                self.buckets.write_record(pos, &r)?;
                self.invalidate(key, &r.doc_id);
                Ok(())
            }
            // key was never indexed, index might be behind its documents.
            Found::Empty => err_at!(TryReindex, msg: "key {:?} not in {}", key, self.to_name()),
            Found::Miss(_, _) => err_at!(DocIdNotFound, msg: "doc_id {:?}", doc_id),
        }
    }

    fn next_all(&mut self, cursor: &mut Cursor) -> Result<Option<Entry>> {
        self.buckets.next_live(cursor)
    }

    fn next_many(&mut self, key: &[u8], cursor: &mut Cursor) -> Result<Option<Entry>> {
        self.buckets.next_chained(key, cursor)
    }

    fn make_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.buckets.as_layout().check_key(key)?;
        Ok(key.to_vec())
    }

    fn make_key_value(&self, doc: &Doc) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        match &self.keys {
            Keys::Single(key_fn) => match key_fn(doc) {
                Some((key, value)) => Ok(Some((self.make_key(&key)?, value))),
                None => Ok(None),
            },
            Keys::Multi(_) => {
                err_at!(NotImplemented, msg: "{:?} has many keys per document", self.to_name())
            }
        }
    }

    fn make_keys_values(&self, doc: &Doc) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut kvs = vec![];
        for (key, value) in self.keys.derive(doc).into_iter() {
            kvs.push((self.make_key(&key)?, value));
        }
        Ok(kvs)
    }

    fn create_key(&mut self) -> Result<Vec<u8>> {
        err_at!(NotImplemented, msg: "{:?} keys derive from documents", self.to_name())
    }

    fn storage(&mut self) -> Result<&mut dyn Storage> {
        Ok(self.buckets.base.as_mut_storage())
    }

    fn clear_cache(&mut self) {
        self.find_key.clear();
        self.locate.clear();
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
