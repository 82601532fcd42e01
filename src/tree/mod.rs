//! Module implement an ordered index, with range scans.
//!
//! Bucket file layout:
//!
//! ```text
//! | header, start_ind bytes | records ... |
//! ```
//!
//! Records share the fixed width layout of hash indexes, refer
//! [crate::hash::Layout], and are appended in insertion order. Key order
//! is kept in memory, as a sorted map from `(key, doc_id)` to record
//! position, and rebuilt by scanning the records on open. Entries under
//! the same key are ordered by their doc-id.
//!
//! Deleted records are marked as such in place, and dropped only by
//! [Index::compact]. `hash_lim` from configuration is not used.

use log::{debug, warn};

use std::{collections::BTreeMap, ops::Bound};

use crate::{
    cache::{self, Cache, KeyCache},
    db::Doc,
    hash::{Config, KeyFn, Keys, Layout, Record},
    index::{
        files::{purge_index_files, to_bucket_location, to_compact_name, to_storage_location},
        Base, Cursor, Entry, Index, Params, Status,
    },
    storage::{FileStorage, Storage},
    util, Error, Result,
};

/// Sorted `(key, doc_id)` to record position.
type Tree = BTreeMap<(Vec<u8>, Vec<u8>), u64>;

/// Ordered index, many entries per key, supports range scans via
/// [Index::next_between] and [Index::get_between].
///
/// Created with [Keys::Multi], a document is indexed under every key
/// derived from it, and the index kind is `"multi_tree"`.
pub struct TreeIndex {
    config: Config,
    keys: Keys,
    base: Base,
    layout: Layout,
    tree: Tree,
    find_key: KeyCache<Vec<u8>, Entry>,
}

impl TreeIndex {
    /// Create a tree index instance, with file storage. Call
    /// [Index::create_index] or [Index::open_index] before using it.
    pub fn new(config: &Config, key_fn: KeyFn) -> Result<TreeIndex> {
        TreeIndex::with_keys(config, Keys::Single(key_fn))
    }

    pub fn with_keys(config: &Config, keys: Keys) -> Result<TreeIndex> {
        let storage = Box::new(FileStorage::new(&config.dir, &config.name));
        TreeIndex::with_storage(config, keys, storage)
    }

    pub fn with_storage(
        config: &Config,
        keys: Keys,
        storage: Box<dyn Storage>,
    ) -> Result<TreeIndex> {
        let layout = Layout::new(config.key_size, config.id_size)?;

        let kind = if keys.is_multi() { "multi_tree" } else { "tree" };
        let mut params = Params::new(&config.name, kind);
        params.key_size = config.key_size as u64;
        params.id_size = config.id_size as u64;
        let base = Base::new(&config.dir, params, config.start_ind, storage);

        let (size, policy, guard) = (config.cache_size, config.cache_policy, config.cache_guard);
        let val = TreeIndex {
            config: config.clone(),
            keys,
            base,
            layout,
            tree: Tree::new(),
            find_key: cache::new_cache(policy, size, guard),
        };
        Ok(val)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn write_record(&mut self, pos: u64, r: &Record) -> Result<()> {
        let buf = self.layout.encode(r)?;
        util::write_at(self.base.as_mut_fd()?, pos, &buf)?;
        Ok(())
    }

    fn append_record(&mut self, r: &Record) -> Result<u64> {
        let buf = self.layout.encode(r)?;
        let start_ind = self.base.to_start_ind();
        let fpos = util::append(self.base.as_mut_fd()?, &buf)?;
        if fpos < start_ind {
            err_at!(Fatal, msg: "record at {} within header {}", fpos, start_ind)
        } else {
            Ok(fpos)
        }
    }

    /// Rebuild key order from the records on disk, return the number of
    /// live entries.
    fn load(&mut self) -> Result<usize> {
        let n = self.layout.to_record_size();
        let mut fpos = self.base.to_start_ind();

        self.tree.clear();
        while let Some(buf) = util::read_at(self.base.as_mut_fd()?, fpos, n)? {
            let r = self.layout.decode(&buf)?;
            if r.is_live() {
                self.tree.insert((r.key, r.doc_id), fpos);
            }
            fpos += n as u64;
        }
        Ok(self.tree.len())
    }

    /// Entries for `key`, in doc-id order.
    fn key_entries<'a>(&'a self, key: &'a [u8]) -> impl Iterator<Item = (&'a Vec<u8>, u64)> + 'a {
        self.tree
            .range((key.to_vec(), vec![])..)
            .take_while(move |((k, _), _)| k.as_slice() == key)
            .map(|((_, doc_id), pos)| (doc_id, *pos))
    }

    /// Return position of the live record for `(key, doc_id)`.
    fn locate(&self, key: &[u8], doc_id: &[u8]) -> Result<u64> {
        match self.tree.get(&(key.to_vec(), doc_id.to_vec())) {
            Some(pos) => Ok(*pos),
            None if self.key_entries(key).next().is_some() => {
                err_at!(DocIdNotFound, msg: "doc_id {:?}", doc_id)
            }
            None => err_at!(KeyNotFound, msg: "key {:?}", key),
        }
    }

    /// Step through live entries with keys between `low` and `high`,
    /// resuming after `cursor.last`.
    fn walk(
        &mut self,
        low: Bound<&[u8]>,
        high: Bound<&[u8]>,
        cursor: &mut Cursor,
    ) -> Result<Option<Entry>> {
        while !cursor.is_exhausted() {
            let from = match (cursor.last.take(), low) {
                (Some(last), _) => Bound::Excluded(last),
                (None, Bound::Unbounded) => Bound::Unbounded,
                (None, Bound::Included(key)) | (None, Bound::Excluded(key)) => {
                    Bound::Included((key.to_vec(), vec![]))
                }
            };
            let next = self
                .tree
                .range((from, Bound::Unbounded))
                .find(|((key, _), _)| match low {
                    Bound::Excluded(low) => key.as_slice() > low,
                    _ => true,
                })
                .map(|(kd, pos)| (kd.clone(), *pos));

            let ((key, doc_id), pos) = match next {
                Some(item) => item,
                None => {
                    cursor.done = true;
                    break;
                }
            };
            let within = match high {
                Bound::Included(high) => key.as_slice() <= high,
                Bound::Excluded(high) => key.as_slice() < high,
                Bound::Unbounded => true,
            };
            if !within {
                cursor.done = true;
                break;
            }

            cursor.last = Some((key, doc_id));
            if cursor.admit() {
                return Ok(Some(read_record(&mut self.base, &self.layout, pos)?.to_entry()));
            }
        }
        Ok(None)
    }

    /// Copy live entries, in key order, into `other`, a fresh index under
    /// a scratch name, and move its files over this index's files.
    /// Scratch files are purged before and, on failure, after the copy.
    fn compact_into(&mut self, other: &mut TreeIndex) -> Result<usize> {
        let (dir, name) = (self.base.to_dir(), self.base.to_name());
        let scratch = other.to_name();
        if purge_index_files(&dir, &scratch)? {
            warn!(target: "bucketdb", "{:?}, purged stale {:?} files", name, scratch);
        }

        let positions: Vec<u64> = self.tree.values().copied().collect();
        let res = || -> Result<usize> {
            other.create_index()?;
            for pos in positions.iter() {
                let r = read_record(&mut self.base, &self.layout, *pos)?;
                let value = match r.to_entry().is_empty_value() {
                    true => vec![],
                    false => self.base.as_mut_storage().get(r.start, r.size)?,
                };
                other.insert_with_storage(&r.key, &r.doc_id, &value)?;
            }
            other.save_params(&mut |p: &mut Params| p.name = name.clone())?;
            other.close_index()?;
            Ok(positions.len())
        }();
        let n = match res {
            Ok(n) => n,
            Err(err) => {
                warn!(target: "bucketdb", "{:?}, compaction failed {}", name, err);
                other.close_index().ok();
                purge_index_files(&dir, &scratch)?;
                return Err(err);
            }
        };

        let buck = to_bucket_location(&dir, &scratch);
        let stor = to_storage_location(&dir, &scratch);
        self.base.replace_files(&buck, &stor)?;
        self.open_index()?;
        Ok(n)
    }
}

fn read_record(base: &mut Base, layout: &Layout, pos: u64) -> Result<Record> {
    let n = layout.to_record_size();
    match util::read_at(base.as_mut_fd()?, pos, n)? {
        Some(buf) => layout.decode(&buf),
        None => err_at!(IndexFail, msg: "record at {} beyond file", pos),
    }
}

impl Index for TreeIndex {
    fn to_name(&self) -> String {
        self.base.to_name()
    }

    fn to_params(&self) -> Params {
        self.base.as_params().clone()
    }

    fn create_index(&mut self) -> Result<()> {
        self.base.create_file(0)?;
        self.tree.clear();
        self.clear_cache();
        Ok(())
    }

    /// Open bucket file, persisted key and doc-id sizes take precedence
    /// over configured values.
    fn open_index(&mut self) -> Result<()> {
        self.base.open_file()?;

        let params = self.base.as_params();
        let key_size = err_at!(FailConvert, usize::try_from(params.key_size))?;
        let id_size = err_at!(FailConvert, usize::try_from(params.id_size))?;
        self.layout = Layout::new(key_size, id_size)?;
        self.clear_cache();

        let n = self.load()?;
        debug!(target: "bucketdb", "{:?}, loaded {} entries", self.to_name(), n);
        Ok(())
    }

    fn close_index(&mut self) -> Result<()> {
        self.clear_cache();
        self.tree.clear();
        self.base.close()
    }

    fn destroy(&mut self) -> Result<()> {
        self.clear_cache();
        self.tree.clear();
        self.base.destroy()
    }

    fn flush(&mut self) {
        self.base.flush()
    }

    fn fsync(&mut self) {
        self.base.fsync()
    }

    fn compact(&mut self) -> Result<()> {
        let name = self.to_name();
        let mut config = self.config.rename(&to_compact_name(&name));
        config
            .set_key_size(self.layout.key_size)
            .set_id_size(self.layout.id_size);

        let mut other = TreeIndex::with_keys(&config, self.keys.clone())?;
        let n = self.compact_into(&mut other)?;

        debug!(target: "bucketdb", "{:?}, compacted {} entries", name, n);
        Ok(())
    }

    fn save_params(&mut self, f: &mut dyn FnMut(&mut Params)) -> Result<()> {
        self.base.save_params(f)
    }

    fn insert(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()> {
        self.layout.check_key(key)?;
        self.layout.check_doc_id(doc_id)?;

        let r = Record::new(key, doc_id, start, size, 0);
        let kd = (key.to_vec(), doc_id.to_vec());
        match self.tree.get(&kd).copied() {
            Some(pos) => self.write_record(pos, &r)?,
            None => {
                let pos = self.append_record(&r)?;
                self.tree.insert(kd, pos);
            }
        }

        self.find_key.delete(&key.to_vec());
        Ok(())
    }

    fn update(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()> {
        let pos = self.locate(key, doc_id)?;
        let old = read_record(&mut self.base, &self.layout, pos)?;
        let r = Record {
            start,
            size,
            status: Status::Ok,
            ..old
        };
        self.write_record(pos, &r)?;

        self.find_key.delete(&key.to_vec());
        Ok(())
    }

    /// Return the first live entry for `key`, in doc-id order.
    fn get(&mut self, key: &[u8]) -> Result<Entry> {
        let pos = self.key_entries(key).next().map(|(_, pos)| pos);
        let (base, layout) = (&mut self.base, &self.layout);
        self.find_key
            .get_or_compute(key.to_vec(), |key| match pos {
                Some(pos) => Ok(read_record(base, layout, pos)?.to_entry()),
                None => err_at!(KeyNotFound, msg: "key {:?}", key),
            })
    }

    /// Mark entry as deleted. Entry is identified by `doc_id`, or by
    /// `(start, size)` if `doc_id` is empty.
    fn delete(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()> {
        let found = match doc_id.is_empty() {
            true => {
                let positions: Vec<u64> = self.key_entries(key).map(|(_, pos)| pos).collect();
                let mut found = None;
                for pos in positions.into_iter() {
                    let r = read_record(&mut self.base, &self.layout, pos)?;
                    if (r.start, r.size) == (start, size) {
                        found = Some((pos, r));
                        break;
                    }
                }
                found
            }
            false => match self.tree.get(&(key.to_vec(), doc_id.to_vec())).copied() {
                Some(pos) => Some((pos, read_record(&mut self.base, &self.layout, pos)?)),
                None => None,
            },
        };

        match found {
            Some((pos, old)) => {
                let r = Record {
                    status: Status::Deleted,
                    ..old
                };
                self.write_record(pos, &r)?;
                self.tree.remove(&(r.key, r.doc_id));
                self.find_key.delete(&key.to_vec());
                Ok(())
            }
            // key was never indexed, index might be behind its documents.
            None if self.key_entries(key).next().is_none() => {
                err_at!(TryReindex, msg: "key {:?} not in {}", key, self.to_name())
            }
            None => err_at!(DocIdNotFound, msg: "doc_id {:?}", doc_id),
        }
    }

    /// Step through every live entry, in key order.
    fn next_all(&mut self, cursor: &mut Cursor) -> Result<Option<Entry>> {
        self.walk(Bound::Unbounded, Bound::Unbounded, cursor)
    }

    fn next_many(&mut self, key: &[u8], cursor: &mut Cursor) -> Result<Option<Entry>> {
        self.walk(Bound::Included(key), Bound::Included(key), cursor)
    }

    fn next_between(
        &mut self,
        low: Bound<&[u8]>,
        high: Bound<&[u8]>,
        cursor: &mut Cursor,
    ) -> Result<Option<Entry>> {
        self.walk(low, high, cursor)
    }

    fn make_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.layout.check_key(key)?;
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
        Ok(self.base.as_mut_storage())
    }

    fn clear_cache(&mut self) {
        self.find_key.clear();
    }
}
