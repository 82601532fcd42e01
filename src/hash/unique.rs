use log::debug;

use crate::{
    cache::{self, Cache, KeyCache},
    db::Doc,
    hash::{Buckets, Config, Found, Record, REV_SIZE},
    index::{files::to_compact_name, Cursor, Entry, Index, Params, Status},
    storage::{FileStorage, Storage},
    util, Error, Result,
};

/// Size of document ids, 32 hex characters.
pub const ID_LEN: usize = 32;

/// Hash index with a single entry per key, meant for the `id` index.
///
/// Entry's key is the document id and entry's doc-id is the document's
/// revision. Deleted entries are kept, with ZERO revision, until the
/// index is compacted, so that lookups can tell a deleted document from
/// a missing one.
pub struct UniqueHashIndex {
    config: Config,
    buckets: Buckets,
    find_key: KeyCache<Vec<u8>, Entry>,
}

impl UniqueHashIndex {
    /// Create a unique index instance with file storage. Keys are fixed to
    /// 32 bytes and revisions to 8 bytes, irrespective of `config`.
    pub fn new(config: &Config) -> Result<UniqueHashIndex> {
        let storage = Box::new(FileStorage::new(&config.dir, &config.name));
        UniqueHashIndex::with_storage(config, storage)
    }

    pub fn with_storage(config: &Config, storage: Box<dyn Storage>) -> Result<UniqueHashIndex> {
        let mut config = config.clone();
        config.set_key_size(ID_LEN).set_id_size(REV_SIZE);

        let (size, policy, guard) = (config.cache_size, config.cache_policy, config.cache_guard);
        let val = UniqueHashIndex {
            buckets: Buckets::new(&config, "unique", storage)?,
            find_key: cache::new_cache(policy, size, guard),
            config,
        };
        Ok(val)
    }

    fn compact_with(&mut self, hash_lim: Option<u64>) -> Result<()> {
        let name = self.to_name();
        let mut config = self.config.rename(&to_compact_name(&name));
        config.set_hash_lim(hash_lim.unwrap_or_else(|| self.buckets.to_hash_lim()));

        let mut other = UniqueHashIndex::new(&config)?;
        let n = self.buckets.compact_into(&mut other)?;
        self.clear_cache();

        debug!(target: "bucketdb", "{:?}, compacted {} entries", name, n);
        Ok(())
    }

    fn find(&mut self, key: &[u8]) -> Result<Found> {
        self.buckets.find(key, |r| r.key == key)
    }
}

impl Index for UniqueHashIndex {
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

    /// Insert a new key, fails with IndexConflict if key is already
    /// present. Deleted keys can be inserted again.
    fn insert(&mut self, key: &[u8], rev: &[u8], start: u64, size: u64) -> Result<()> {
        self.buckets.as_layout().check_key(key)?;
        self.buckets.as_layout().check_doc_id(rev)?;

        let r = Record::new(key, rev, start, size, 0);
        match self.find(key)? {
            Found::Hit(_, old) if old.is_live() => {
                err_at!(IndexConflict, msg: "key {:?} already exists", key)?
            }
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

        self.find_key.delete(&key.to_vec());
        Ok(())
    }

    /// Update revision, and value if `(start, size)` is not `(0, 0)`.
    fn update(&mut self, key: &[u8], rev: &[u8], start: u64, size: u64) -> Result<()> {
        self.buckets.as_layout().check_doc_id(rev)?;

        match self.find(key)? {
            Found::Hit(pos, old) => {
                let (start, size) = match (start, size) {
                    (0, 0) => (old.start, old.size),
                    (start, size) => (start, size),
                };
                let r = Record {
                    doc_id: rev.to_vec(),
                    start,
                    size,
                    status: Status::Ok,
                    ..old
                };
                self.buckets.write_record(pos, &r)?;
            }
            _ => err_at!(KeyNotFound, msg: "key {:?}", key)?,
        }

        self.find_key.delete(&key.to_vec());
        Ok(())
    }

    /// Return the entry for key, including deleted entries.
    fn get(&mut self, key: &[u8]) -> Result<Entry> {
        let buckets = &mut self.buckets;
        self.find_key.get_or_compute(key.to_vec(), |key| {
            match buckets.find(key, |r| &r.key == key)? {
                Found::Hit(_, r) => Ok(r.to_entry()),
                _ => err_at!(KeyNotFound, msg: "key {:?}", key),
            }
        })
    }

    /// Mark entry as deleted and zero its revision. Value pointer is
    /// retained if `(start, size)` is `(0, 0)`.
    fn delete(&mut self, key: &[u8], _rev: &[u8], start: u64, size: u64) -> Result<()> {
        match self.find(key)? {
            Found::Hit(pos, old) => {
                let (start, size) = match (start, size) {
                    (0, 0) => (old.start, old.size),
                    (start, size) => (start, size),
                };
                let r = Record {
                    doc_id: vec![b'0'; REV_SIZE],
                    start,
                    size,
                    status: Status::Deleted,
                    ..old
                };
                self.buckets.write_record(pos, &r)?;
            }
            _ => err_at!(KeyNotFound, msg: "key {:?}", key)?,
        }

        self.find_key.delete(&key.to_vec());
        Ok(())
    }

    fn next_all(&mut self, cursor: &mut Cursor) -> Result<Option<Entry>> {
        self.buckets.next_live(cursor)
    }

    /// Yields atmost one entry.
    fn next_many(&mut self, key: &[u8], cursor: &mut Cursor) -> Result<Option<Entry>> {
        if cursor.is_exhausted() {
            return Ok(None);
        }
        cursor.done = true;
        match self.get(key) {
            Ok(entry) if !entry.is_deleted() && cursor.admit() => Ok(Some(entry)),
            Ok(_) | Err(Error::KeyNotFound(_, _)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Keys are 32 byte hex strings.
    fn make_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.len() != ID_LEN {
            err_at!(Preconditions, msg: "invalid id length {}", key.len())
        } else if !key.iter().all(|ch| ch.is_ascii_hexdigit()) {
            err_at!(Preconditions, msg: "invalid id {:?}", String::from_utf8_lossy(key))
        } else {
            Ok(key.to_vec())
        }
    }

    /// Return `(id, body)` for document, id is validated like any other
    /// application supplied key.
    fn make_key_value(&self, doc: &Doc) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        match &doc.id {
            Some(id) => Ok(Some((self.make_key(id.as_bytes())?, doc.body.clone()))),
            None => err_at!(Preconditions, msg: "missing id"),
        }
    }

    fn create_key(&mut self) -> Result<Vec<u8>> {
        Ok(util::random_hex_32().into_bytes())
    }

    fn storage(&mut self) -> Result<&mut dyn Storage> {
        Ok(self.buckets.base.as_mut_storage())
    }

    fn clear_cache(&mut self) {
        self.find_key.clear();
    }
}

#[cfg(test)]
#[path = "unique_test.rs"]
mod unique_test;
