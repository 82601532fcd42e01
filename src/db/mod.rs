//! Module implement the database façade over indexes.
//!
//! A database is a directory holding an `id` index, which owns the
//! documents, and any number of secondary indexes, which map keys derived
//! from documents back to document ids.
//!
//! **Documents**
//!
//! Every document has a 32 character hex id and an 8 character hex
//! revision. Revision is `"0001"` followed by 4 random hex characters on
//! insert, and on every update the first four characters are incremented,
//! wrapping back to ZERO beyond `65025`. Update and delete shall supply the
//! current revision, else fail with [Error::RevConflict].
//!
//! **Index definitions**
//!
//! Index definitions are code, via [crate::hash::KeyFn] or
//! [crate::hash::MultiKeyFn], hence they are not persisted. A secondary
//! index can derive any number of keys from a document, and updates
//! touch only the keys that changed. Add secondary indexes before [Db::open] to attach
//! existing indexes, or after [Db::create]/[Db::open] to create new ones.
//!
//! **Thread safety**
//!
//! [Database] is single threaded, wrap it with [SafeDatabase] to share
//! it across threads.

use log::{debug, info, warn};
use rand::random;

use std::{collections::HashSet, fs, ops::Bound, path};

use crate::{
    hash::UniqueHashIndex,
    index::{as_bound, Cursor, Entry, Index, Walk, EMPTY_VALUE},
    shard::{PrefixShard, ShardedIndex},
    Error, Result,
};

mod config;
mod safe;

pub use config::{Config, TomlCache, TomlConfig};
pub use safe::{Hold, SafeDatabase, SafeScan};

/// Name of the primary index.
pub const ID_INDEX: &str = "id";

/// Revision counter wraps back to ZERO beyond this value.
pub const MAX_REV: u32 = 65025;

/// Document as seen by the database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Doc {
    /// Document id, generated by the `id` index on insert if missing.
    pub id: Option<String>,
    /// Document revision, shall be missing on insert.
    pub rev: Option<String>,
    /// Opaque document body.
    pub body: Vec<u8>,
}

impl Doc {
    pub fn new(body: &[u8]) -> Doc {
        Doc {
            id: None,
            rev: None,
            body: body.to_vec(),
        }
    }

    pub fn set_id(&mut self, id: &str) -> &mut Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn set_rev(&mut self, rev: &str) -> &mut Self {
        self.rev = Some(rev.to_string());
        self
    }
}

/// Single result from a lookup or a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Document id.
    pub id: String,
    /// Document revision, for the `id` index. Index key, otherwise.
    pub tag: Vec<u8>,
    /// For the `id` index, document body. Value derived from the
    /// document, otherwise.
    pub value: Vec<u8>,
}

/// Compute the next revision for document.
pub fn new_rev(old: Option<&str>) -> Result<String> {
    let rnd = random::<u16>();
    match old {
        Some(old) => {
            let n = match old.get(..4).map(|s| u32::from_str_radix(s, 16)) {
                Some(Ok(n)) => n + 1,
                _ => err_at!(RevConflict, msg: "invalid revision {:?}", old)?,
            };
            let n = if n > MAX_REV { 0 } else { n };
            Ok(format!("{:04x}{:04x}", n, rnd))
        }
        None => Ok(format!("0001{:04x}", rnd)),
    }
}

/// How values for the `id` index are written to and read from storage.
pub trait IdStore: Send {
    fn insert(&self, index: &mut dyn Index, id: &[u8], rev: &[u8], value: &[u8]) -> Result<()>;

    fn update(&self, index: &mut dyn Index, id: &[u8], rev: &[u8], value: &[u8]) -> Result<()>;

    fn read(&self, index: &mut dyn Index, entry: &Entry) -> Result<Vec<u8>>;
}

/// Values are kept in the index's own storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectStore;

impl IdStore for DirectStore {
    fn insert(&self, index: &mut dyn Index, id: &[u8], rev: &[u8], value: &[u8]) -> Result<()> {
        let (start, size) = match value.is_empty() {
            true => EMPTY_VALUE,
            false => index.storage()?.insert(value)?,
        };
        index.insert(id, rev, start, size)
    }

    fn update(&self, index: &mut dyn Index, id: &[u8], rev: &[u8], value: &[u8]) -> Result<()> {
        let (start, size) = match value.is_empty() {
            true => EMPTY_VALUE,
            false => index.storage()?.insert(value)?,
        };
        index.update(id, rev, start, size)
    }

    fn read(&self, index: &mut dyn Index, entry: &Entry) -> Result<Vec<u8>> {
        match entry.is_empty_value() {
            true => Ok(vec![]),
            false => index.storage()?.get(entry.start, entry.size),
        }
    }
}

/// Values are kept in the storage of the shard owning the id.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShardStore;

impl IdStore for ShardStore {
    fn insert(&self, index: &mut dyn Index, id: &[u8], rev: &[u8], value: &[u8]) -> Result<()> {
        let (start, size) = match value.is_empty() {
            true => EMPTY_VALUE,
            false => index.shard_storage(id)?.insert(value)?,
        };
        index.insert(id, rev, start, size)
    }

    fn update(&self, index: &mut dyn Index, id: &[u8], rev: &[u8], value: &[u8]) -> Result<()> {
        let (start, size) = match value.is_empty() {
            true => EMPTY_VALUE,
            false => index.shard_storage(id)?.insert(value)?,
        };
        index.update(id, rev, start, size)
    }

    fn read(&self, index: &mut dyn Index, entry: &Entry) -> Result<Vec<u8>> {
        match entry.is_empty_value() {
            true => Ok(vec![]),
            false => index.shard_storage(&entry.key)?.get(entry.start, entry.size),
        }
    }
}

/// Database operations.
pub trait Db: Send {
    /// Create database directory and every index added so far.
    fn create(&mut self) -> Result<()>;

    /// Open an existing database, with every index added so far.
    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Remove every index, and the database directory, from disk.
    fn destroy(&mut self) -> Result<()>;

    fn is_opened(&self) -> bool;

    /// Add a secondary index, return its name. Index is created if the
    /// database is already opened.
    fn add_index(&mut self, index: Box<dyn Index>) -> Result<String>;

    /// Replace a secondary index by a new definition under the same name,
    /// optionally reindexing it.
    fn edit_index(&mut self, index: Box<dyn Index>, reindex: bool) -> Result<String>;

    fn destroy_index(&mut self, name: &str) -> Result<()>;

    /// Rebuild a secondary index from the `id` index.
    fn reindex_index(&mut self, name: &str) -> Result<()>;

    fn compact_index(&mut self, name: &str) -> Result<()>;

    /// Compact index `name` into `hash_lim + 1` slots, hash indexes only.
    fn rehash_index(&mut self, name: &str, hash_lim: u64) -> Result<()>;

    /// Return index names, `id` index first.
    fn to_index_names(&self) -> Vec<String>;

    /// Insert a new document, return its `(id, rev)`.
    fn insert(&mut self, doc: &Doc) -> Result<(String, String)>;

    /// Update a document, return its `(id, new_rev)`.
    fn update(&mut self, doc: &Doc) -> Result<(String, String)>;

    fn delete(&mut self, doc: &Doc) -> Result<()>;

    /// Lookup `key` in index `index_name`.
    fn get(&mut self, index_name: &str, key: &[u8]) -> Result<Record>;

    /// Step through every record in index `index_name`.
    fn next_all(&mut self, index_name: &str, cursor: &mut Cursor) -> Result<Option<Record>>;

    /// Step through records for `key` in index `index_name`.
    fn next_many(
        &mut self,
        index_name: &str,
        key: &[u8],
        cursor: &mut Cursor,
    ) -> Result<Option<Record>>;

    /// Step through records with keys between `low` and `high` in index
    /// `index_name`, in key order. Only ordered indexes support this.
    fn next_between(
        &mut self,
        index_name: &str,
        low: Bound<&[u8]>,
        high: Bound<&[u8]>,
        cursor: &mut Cursor,
    ) -> Result<Option<Record>>;

    /// Flush every index. Buffered writes are handed over to the OS, call
    /// [Db::fsync] for durability.
    fn flush(&mut self) -> Result<()>;

    fn flush_indexes(&mut self) -> Result<()>;

    fn fsync(&mut self) -> Result<()>;

    /// Compact every index.
    fn compact(&mut self) -> Result<()>;

    /// Reindex every secondary index.
    fn reindex(&mut self) -> Result<()>;

    /// Count records in index `index_name`.
    fn count(&mut self, index_name: &str) -> Result<usize>;

    /// Lazy scan over every record in index, skipping `start_pos` records.
    fn all(&mut self, index_name: &str, start_pos: usize) -> Scan<'_, Self> {
        Scan::new(self, index_name, Walk::All, Cursor::new(start_pos, 0))
    }

    /// Lazy scan over records for `key`, skipping `start_from` records and
    /// returning at most `limit` records, ZERO for unlimited.
    fn get_many(
        &mut self,
        index_name: &str,
        key: &[u8],
        start_from: Option<usize>,
        limit: usize,
    ) -> Scan<'_, Self> {
        let cursor = Cursor::new(start_from.unwrap_or(0), limit);
        Scan::new(self, index_name, Walk::Key(key.to_vec()), cursor)
    }

    /// Lazy scan over records with keys between `low` and `high`, in key
    /// order. Skip `start_from` records and return at most `limit`
    /// records, ZERO for unlimited.
    fn get_between(
        &mut self,
        index_name: &str,
        low: Bound<&[u8]>,
        high: Bound<&[u8]>,
        start_from: Option<usize>,
        limit: usize,
    ) -> Scan<'_, Self> {
        let cursor = Cursor::new(start_from.unwrap_or(0), limit);
        Scan::new(self, index_name, Walk::range(low, high), cursor)
    }

    /// Take one `walk` step on index `index_name`.
    fn next_walk(
        &mut self,
        index_name: &str,
        walk: &Walk,
        cursor: &mut Cursor,
    ) -> Result<Option<Record>> {
        match walk {
            Walk::All => self.next_all(index_name, cursor),
            Walk::Key(key) => self.next_many(index_name, key, cursor),
            Walk::Range(low, high) => {
                self.next_between(index_name, as_bound(low), as_bound(high), cursor)
            }
        }
    }
}

/// Iterator over database records, taking one [Db::next_walk] step at a
/// time.
pub struct Scan<'a, D: ?Sized> {
    db: &'a mut D,
    index_name: String,
    walk: Walk,
    cursor: Cursor,
}

impl<'a, D: ?Sized> Scan<'a, D> {
    fn new(db: &'a mut D, index_name: &str, walk: Walk, cursor: Cursor) -> Self {
        Scan {
            db,
            index_name: index_name.to_string(),
            walk,
            cursor,
        }
    }
}

impl<'a, D> Iterator for Scan<'a, D>
where
    D: Db + ?Sized,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_exhausted() {
            return None;
        }

        match self.db.next_walk(&self.index_name, &self.walk, &mut self.cursor) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.cursor.done = true;
                None
            }
            Err(err) => {
                self.cursor.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Database over an `id` index and secondary indexes.
pub struct Database {
    config: Config,
    // id index is always the first index.
    indexes: Vec<Box<dyn Index>>,
    id_store: Box<dyn IdStore>,
    // indexes being reindexed or compacted.
    busy: HashSet<String>,
    opened: bool,
}

impl Database {
    /// Create a database instance. The `id` index is a unique hash index,
    /// sharded if `config.id_shards` is more than one.
    pub fn new(config: &Config) -> Result<Database> {
        let (index, id_store): (Box<dyn Index>, Box<dyn IdStore>) = match config.id_shards {
            1 => {
                let index = UniqueHashIndex::new(&config.to_hash_config(ID_INDEX))?;
                (Box::new(index), Box::new(DirectStore))
            }
            n => {
                let cfg = config.clone();
                let index = ShardedIndex::new(
                    &config.dir,
                    ID_INDEX,
                    n,
                    PrefixShard,
                    move |_dir, name| {
                        let index = UniqueHashIndex::new(&cfg.to_hash_config(name))?;
                        Ok(Box::new(index) as Box<dyn Index>)
                    },
                )?;
                (Box::new(index), Box::new(ShardStore))
            }
        };
        Database::with_id_index(config, index, id_store)
    }

    /// Create a database instance with a custom `id` index.
    pub fn with_id_index(
        config: &Config,
        index: Box<dyn Index>,
        id_store: Box<dyn IdStore>,
    ) -> Result<Database> {
        if index.to_name() != ID_INDEX {
            err_at!(Preconditions, msg: "id index named {:?}", index.to_name())?
        }

        Ok(Database {
            config: config.clone(),
            indexes: vec![index],
            id_store,
            busy: HashSet::default(),
            opened: false,
        })
    }

    fn check_opened(&self) -> Result<()> {
        match self.opened {
            true => Ok(()),
            false => err_at!(Preconditions, msg: "database {:?} not opened", self.config.dir),
        }
    }

    fn to_position(&self, name: &str) -> Option<usize> {
        self.indexes.iter().position(|index| index.to_name() == name)
    }

    fn to_index(&self, name: &str) -> Result<usize> {
        match self.to_position(name) {
            Some(pos) => Ok(pos),
            None => err_at!(IndexNotFound, msg: "index {:?} doesn't exist", name),
        }
    }

    fn to_secondary(&self, name: &str, what: &str) -> Result<usize> {
        match self.to_position(name) {
            Some(0) => err_at!(Preconditions, msg: "id index cannot be {}", what),
            Some(pos) => Ok(pos),
            None => err_at!(Preconditions, msg: "no index named {:?}", name),
        }
    }

    fn mark_busy(&mut self, name: &str) -> Result<()> {
        match self.busy.insert(name.to_string()) {
            true => Ok(()),
            false => err_at!(Reindex, msg: "index {:?} is still reindexing/compacting", name),
        }
    }

    /// Read back the live document for `id`.
    fn get_doc(&mut self, id: &[u8]) -> Result<Doc> {
        let index = self.indexes[0].as_mut();
        let entry = index.get(id)?;
        if (entry.start, entry.size) == (0, 0) {
            err_at!(KeyNotFound, msg: "document {:?} not found", to_id(id)?)?
        } else if entry.is_deleted() {
            err_at!(RecordDeleted, msg: "document {:?} deleted", to_id(id)?)?
        }

        Ok(Doc {
            id: Some(to_id(&entry.key)?),
            rev: Some(to_id(&entry.doc_id)?),
            body: self.id_store.read(index, &entry)?,
        })
    }

    fn to_record(&mut self, pos: usize, entry: Entry) -> Result<Record> {
        match pos {
            0 => {
                let value = self.id_store.read(self.indexes[0].as_mut(), &entry)?;
                Ok(Record {
                    id: to_id(&entry.key)?,
                    tag: entry.doc_id,
                    value,
                })
            }
            pos => {
                let value = self.indexes[pos].read_value(&entry)?;
                Ok(Record {
                    id: to_id(&entry.doc_id)?,
                    tag: entry.key,
                    value,
                })
            }
        }
    }
}

impl Db for Database {
    fn create(&mut self) -> Result<()> {
        if self.opened {
            err_at!(Preconditions, msg: "database {:?} already opened", self.config.dir)?
        }

        err_at!(IOError, fs::create_dir_all(&self.config.dir), "{:?}", self.config.dir)?;
        for index in self.indexes.iter_mut() {
            index.create_index()?;
        }
        self.opened = true;

        info!(target: "bucketdb", "{:?}, created database", self.config.dir);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        if self.opened {
            err_at!(Preconditions, msg: "database {:?} already opened", self.config.dir)?
        } else if !path::Path::new(&self.config.dir).is_dir() {
            err_at!(InvalidInput, msg: "can't open database {:?}", self.config.dir)?
        }

        for index in self.indexes.iter_mut() {
            index.open_index()?;
        }
        self.opened = true;

        info!(
            target: "bucketdb",
            "{:?}, opened database with {} indexes", self.config.dir, self.indexes.len()
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.check_opened()?;

        let mut res = Ok(());
        for index in self.indexes.iter_mut() {
            if let Err(err) = index.close_index() {
                if res.is_ok() {
                    res = Err(err);
                }
            }
        }
        self.opened = false;
        self.busy.clear();

        info!(target: "bucketdb", "{:?}, closed database", self.config.dir);
        res
    }

    fn destroy(&mut self) -> Result<()> {
        let dir = self.config.dir.clone();
        if !path::Path::new(&dir).is_dir() {
            err_at!(Preconditions, msg: "database {:?} doesn't exist", dir)?
        }

        for mut index in self.indexes.drain(1..).rev() {
            if let Err(err) = index.destroy() {
                warn!(target: "bucketdb", "{:?}, destroy {:?} {}", dir, index.to_name(), err);
            }
        }
        self.indexes[0].destroy()?;
        err_at!(IOError, fs::remove_dir_all(&dir), "{:?}", dir)?;
        self.opened = false;
        self.busy.clear();

        info!(target: "bucketdb", "{:?}, destroyed database", dir);
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn add_index(&mut self, mut index: Box<dyn Index>) -> Result<String> {
        let name = index.to_name();
        if self.to_position(&name).is_some() {
            err_at!(IndexConflict, msg: "index {:?} already exists", name)?
        }

        if self.opened {
            index.create_index()?;
        }
        self.indexes.push(index);

        debug!(target: "bucketdb", "{:?}, added index {:?}", self.config.dir, name);
        Ok(name)
    }

    fn edit_index(&mut self, mut index: Box<dyn Index>, reindex: bool) -> Result<String> {
        let name = index.to_name();
        let pos = match self.to_position(&name) {
            Some(0) => err_at!(Preconditions, msg: "id index cannot be edited")?,
            Some(pos) => pos,
            None => err_at!(IndexNotFound, msg: "index {:?} doesn't exist", name)?,
        };

        // replacement shall open before the current index is let go.
        if self.opened {
            index.open_index()?;
            if let Err(err) = self.indexes[pos].close_index() {
                warn!(target: "bucketdb", "{:?}, close replaced index {}", name, err);
            }
        }
        self.indexes[pos] = index;

        debug!(target: "bucketdb", "{:?}, edited index {:?}", self.config.dir, name);
        if reindex {
            self.reindex_index(&name)?;
        }
        Ok(name)
    }

    fn destroy_index(&mut self, name: &str) -> Result<()> {
        let pos = self.to_secondary(name, "destroyed")?;
        self.indexes[pos].destroy()?;
        self.indexes.remove(pos);
        Ok(())
    }

    /// A failed reindex leaves the index marked as busy, until the
    /// database is closed.
    fn reindex_index(&mut self, name: &str) -> Result<()> {
        self.check_opened()?;
        let pos = self.to_secondary(name, "reindexed")?;
        self.mark_busy(name)?;

        let (ids, rest) = self.indexes.split_at_mut(1);
        let (id_index, index) = (ids[0].as_mut(), rest[pos - 1].as_mut());
        index.destroy()?;
        index.create_index()?;

        let (mut cursor, mut n) = (Cursor::default(), 0);
        while let Some(entry) = id_index.next_all(&mut cursor)? {
            let doc = Doc {
                id: Some(to_id(&entry.key)?),
                rev: Some(to_id(&entry.doc_id)?),
                body: self.id_store.read(id_index, &entry)?,
            };
            if insert_secondary(index, &doc, &entry.key)? {
                n += 1;
            }
        }

        self.busy.remove(name);
        info!(target: "bucketdb", "{:?}, reindexed {} documents", name, n);
        Ok(())
    }

    /// A failed compaction leaves the index as it was, and it can be
    /// compacted again.
    fn compact_index(&mut self, name: &str) -> Result<()> {
        self.check_opened()?;
        let pos = match self.to_position(name) {
            Some(pos) => pos,
            None => err_at!(Preconditions, msg: "no index named {:?}", name)?,
        };
        self.mark_busy(name)?;

        let res = self.indexes[pos].compact();
        self.busy.remove(name);
        res
    }

    fn rehash_index(&mut self, name: &str, hash_lim: u64) -> Result<()> {
        self.check_opened()?;
        let pos = match self.to_position(name) {
            Some(pos) => pos,
            None => err_at!(Preconditions, msg: "no index named {:?}", name)?,
        };
        self.mark_busy(name)?;

        let res = self.indexes[pos].rehash(hash_lim);
        self.busy.remove(name);
        if res.is_ok() {
            info!(target: "bucketdb", "{:?}, rehashed into {:#x} slots", name, hash_lim);
        }
        res
    }

    fn to_index_names(&self) -> Vec<String> {
        self.indexes.iter().map(|index| index.to_name()).collect()
    }

    fn insert(&mut self, doc: &Doc) -> Result<(String, String)> {
        self.check_opened()?;
        if doc.rev.is_some() {
            err_at!(Preconditions, msg: "can't insert document with revision")?
        }

        let rev = new_rev(None)?;
        let id = match &doc.id {
            Some(id) => id.clone(),
            None => to_id(&self.indexes[0].create_key()?)?,
        };
        let doc = Doc {
            id: Some(id.clone()),
            rev: Some(rev.clone()),
            body: doc.body.clone(),
        };

        let (key, value) = match self.indexes[0].make_key_value(&doc)? {
            Some(kv) => kv,
            None => err_at!(Preconditions, msg: "document {:?} not indexable", id)?,
        };
        self.id_store.insert(self.indexes[0].as_mut(), &key, rev.as_bytes(), &value)?;

        for index in self.indexes[1..].iter_mut() {
            insert_secondary(index.as_mut(), &doc, id.as_bytes())?;
        }

        Ok((id, rev))
    }

    fn update(&mut self, doc: &Doc) -> Result<(String, String)> {
        self.check_opened()?;
        let (id, rev) = match (&doc.id, &doc.rev) {
            (Some(id), Some(rev)) => (id.clone(), rev.clone()),
            (_, _) => err_at!(Preconditions, msg: "can't update without id and rev")?,
        };

        let key = self.indexes[0].make_key(id.as_bytes())?;
        let old = self.get_doc(&key)?;
        if old.rev.as_ref() != Some(&rev) {
            err_at!(RevConflict, msg: "{:?} revision {:?} != {:?}", id, rev, old.rev)?
        }

        let new_rev = new_rev(Some(&rev))?;
        let doc = Doc {
            id: Some(id.clone()),
            rev: Some(new_rev.clone()),
            body: doc.body.clone(),
        };

        let (key, value) = match self.indexes[0].make_key_value(&doc)? {
            Some(kv) => kv,
            None => err_at!(Preconditions, msg: "document {:?} not indexable", id)?,
        };
        self.id_store.update(self.indexes[0].as_mut(), &key, new_rev.as_bytes(), &value)?;

        for index in self.indexes[1..].iter_mut() {
            update_secondary(index.as_mut(), &old, &doc, id.as_bytes())?;
        }

        Ok((id, new_rev))
    }

    fn delete(&mut self, doc: &Doc) -> Result<()> {
        self.check_opened()?;
        let (id, rev) = match (&doc.id, &doc.rev) {
            (Some(id), Some(rev)) => (id.clone(), rev.clone()),
            (_, _) => err_at!(Preconditions, msg: "can't delete without id and rev")?,
        };

        let key = self.indexes[0].make_key(id.as_bytes())?;
        let old = self.get_doc(&key)?;
        if old.rev.as_ref() != Some(&rev) {
            err_at!(RevConflict, msg: "{:?} revision {:?} != {:?}", id, rev, old.rev)?
        }

        for index in self.indexes[1..].iter_mut() {
            delete_secondary(index.as_mut(), &old, id.as_bytes())?;
        }
        self.indexes[0].delete(&key, rev.as_bytes(), 0, 0)
    }

    fn get(&mut self, index_name: &str, key: &[u8]) -> Result<Record> {
        self.check_opened()?;
        let pos = self.to_index(index_name)?;

        let entry = self.indexes[pos].get(key)?;
        if (entry.start, entry.size) == (0, 0) {
            err_at!(KeyNotFound, msg: "key {:?} not found in {:?}", key, index_name)?
        } else if entry.is_deleted() {
            err_at!(RecordDeleted, msg: "key {:?} deleted in {:?}", key, index_name)?
        }

        self.to_record(pos, entry)
    }

    fn next_all(&mut self, index_name: &str, cursor: &mut Cursor) -> Result<Option<Record>> {
        self.check_opened()?;
        let pos = self.to_index(index_name)?;

        match self.indexes[pos].next_all(cursor)? {
            Some(entry) => Ok(Some(self.to_record(pos, entry)?)),
            None => Ok(None),
        }
    }

    fn next_many(
        &mut self,
        index_name: &str,
        key: &[u8],
        cursor: &mut Cursor,
    ) -> Result<Option<Record>> {
        self.check_opened()?;
        let pos = match self.to_index(index_name)? {
            0 => err_at!(Preconditions, msg: "can't get many from id index")?,
            pos => pos,
        };

        match self.indexes[pos].next_many(key, cursor)? {
            Some(entry) => Ok(Some(self.to_record(pos, entry)?)),
            None => Ok(None),
        }
    }

    fn next_between(
        &mut self,
        index_name: &str,
        low: Bound<&[u8]>,
        high: Bound<&[u8]>,
        cursor: &mut Cursor,
    ) -> Result<Option<Record>> {
        self.check_opened()?;
        let pos = match self.to_index(index_name)? {
            0 => err_at!(Preconditions, msg: "can't scan ranges in id index")?,
            pos => pos,
        };

        match self.indexes[pos].next_between(low, high, cursor)? {
            Some(entry) => Ok(Some(self.to_record(pos, entry)?)),
            None => Ok(None),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_indexes()
    }

    fn flush_indexes(&mut self) -> Result<()> {
        self.check_opened()?;
        self.indexes.iter_mut().for_each(|index| index.flush());
        Ok(())
    }

    fn fsync(&mut self) -> Result<()> {
        self.check_opened()?;
        for index in self.indexes.iter_mut() {
            index.flush();
            index.fsync();
        }
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        self.check_opened()?;
        for name in self.to_index_names().into_iter() {
            self.compact_index(&name)?;
        }
        Ok(())
    }

    fn reindex(&mut self) -> Result<()> {
        self.check_opened()?;
        for name in self.to_index_names().into_iter().skip(1) {
            self.reindex_index(&name)?;
        }
        Ok(())
    }

    fn count(&mut self, index_name: &str) -> Result<usize> {
        self.check_opened()?;
        let pos = self.to_index(index_name)?;

        let (mut cursor, mut n) = (Cursor::default(), 0);
        while self.indexes[pos].next_all(&mut cursor)?.is_some() {
            n += 1;
        }
        Ok(n)
    }
}

fn to_id(bytes: &[u8]) -> Result<String> {
    err_at!(FailConvert, String::from_utf8(bytes.to_vec()))
}

// Derive every `(key, value)` for document, failures are logged and
// treated as not indexed.
fn keys_values(index: &dyn Index, doc: &Doc) -> Vec<(Vec<u8>, Vec<u8>)> {
    match index.make_keys_values(doc) {
        Ok(kvs) => kvs,
        Err(err) => {
            warn!(target: "bucketdb", "{:?}, key for {:?} {}", index.to_name(), doc.id, err);
            vec![]
        }
    }
}

// Return whether document was indexed.
fn insert_secondary(index: &mut dyn Index, doc: &Doc, id: &[u8]) -> Result<bool> {
    let kvs = keys_values(index, doc);
    for (key, value) in kvs.iter() {
        index.insert_with_storage(key, id, value)?;
    }
    Ok(!kvs.is_empty())
}

// Keys dropped by the new document are deleted, keys added are inserted,
// and keys whose value changed are updated.
fn update_secondary(index: &mut dyn Index, old: &Doc, new: &Doc, id: &[u8]) -> Result<()> {
    let (old_kvs, new_kvs) = (keys_values(index, old), keys_values(index, new));

    for (key, _) in old_kvs.iter() {
        if !new_kvs.iter().any(|(k, _)| k == key) {
            delete_key(index, key, id)?;
        }
    }
    for (key, value) in new_kvs.iter() {
        match old_kvs.iter().find(|(k, _)| k == key) {
            Some((_, old_value)) if old_value == value => (),
            Some(_) => match index.update_with_storage(key, id, value) {
                Err(err) if err.is_not_found() => {
                    warn!(target: "bucketdb", "{:?}, reindex might be required", index.to_name());
                }
                res => res?,
            },
            None => index.insert_with_storage(key, id, value)?,
        }
    }
    Ok(())
}

fn delete_secondary(index: &mut dyn Index, old: &Doc, id: &[u8]) -> Result<()> {
    for (key, _) in keys_values(index, old).iter() {
        delete_key(index, key, id)?;
    }
    Ok(())
}

// Index might be behind its documents, missing keys are not an error.
fn delete_key(index: &mut dyn Index, key: &[u8], id: &[u8]) -> Result<()> {
    match index.delete(key, id, 0, 0) {
        Err(Error::TryReindex(_, _)) => {
            debug!(target: "bucketdb", "{:?}, {:?} never indexed", index.to_name(), key);
            Ok(())
        }
        res => res,
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
