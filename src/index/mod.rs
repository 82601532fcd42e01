//! Module define the contract for all index types.
//!
//! An index maps keys to `(doc_id, start, size)` entries, where
//! `(start, size)` locate the document's value in the index's [Storage].
//! Concrete indexes share their lifecycle, bucket file and header
//! handling, through [Base].
//!
//! **Scans**
//!
//! Full scans, multi-entry lookups and range scans are lazy. Each step
//! reads the next entry from disk, and resumes from a [Cursor].
//! [Index::all], [Index::get_many] and [Index::get_between] wrap the
//! stepping methods into iterators. Callers that cannot hold a borrow on
//! the index across steps, like a lock-guarded database, can drive the
//! stepping methods directly, via [Walk].
//!
//! Range scans are supported only by ordered indexes, refer
//! [crate::tree::TreeIndex].
//!
//! **Empty values**
//!
//! Entries whose value is empty point to `(1, 0)`. Storage is never
//! touched for such entries.

use std::{fmt, ops::Bound};

use crate::{db::Doc, storage::Storage, Error, Result};

mod base;
pub mod files;
mod params;

pub use base::Base;
pub use params::{Param, Params, START_IND};

/// Value pointer used for entries with empty value.
pub const EMPTY_VALUE: (u64, u64) = (1, 0);

/// Status of an index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Deleted,
}

impl Status {
    pub fn to_byte(&self) -> u8 {
        match self {
            Status::Ok => b'o',
            Status::Deleted => b'd',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Status> {
        match byte {
            b'o' => Some(Status::Ok),
            b'd' => Some(Status::Deleted),
            _ => None,
        }
    }
}

/// Single index entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Index key. For the `id` index, this is the document id.
    pub key: Vec<u8>,
    /// Document id. For the `id` index, this is the document revision.
    pub doc_id: Vec<u8>,
    /// Value offset within storage.
    pub start: u64,
    /// Value size within storage.
    pub size: u64,
    pub status: Status,
}

impl Entry {
    pub fn new(key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Entry {
        Entry {
            key: key.to_vec(),
            doc_id: doc_id.to_vec(),
            start,
            size,
            status: Status::Ok,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == Status::Deleted
    }

    pub fn is_empty_value(&self) -> bool {
        (self.start, self.size) == EMPTY_VALUE
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Entry<{:?},{:?},{}:{},{:?}>",
            String::from_utf8_lossy(&self.key),
            String::from_utf8_lossy(&self.doc_id),
            self.start,
            self.size,
            self.status
        )
    }
}

/// Resumable position for lazy scans.
///
/// A cursor is forward only. Once done, it stays done.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Shard being scanned, for sharded indexes.
    pub shard: usize,
    /// Index specific position of the next entry, ZERO to begin.
    pub pos: u64,
    /// Number of matching entries to skip.
    pub skip: usize,
    /// Maximum entries to return, ZERO for unlimited.
    pub limit: usize,
    /// Number of entries returned so far.
    pub taken: usize,
    pub done: bool,
    /// Last `(key, doc_id)` visited, for ordered indexes.
    pub last: Option<(Vec<u8>, Vec<u8>)>,
}

impl Cursor {
    pub fn new(skip: usize, limit: usize) -> Cursor {
        Cursor {
            skip,
            limit,
            ..Cursor::default()
        }
    }

    /// Return true if no more entries can be returned.
    pub fn is_exhausted(&self) -> bool {
        self.done || (self.limit > 0 && self.taken >= self.limit)
    }

    /// Account for a matching entry, return true if it shall be
    /// returned to the caller, false if it shall be skipped.
    pub fn admit(&mut self) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            false
        } else {
            self.taken += 1;
            true
        }
    }

    /// Move to the beginning of the next shard.
    pub fn next_shard(&mut self) {
        self.shard += 1;
        self.pos = 0;
        self.last = None;
    }
}

/// What a lazy scan steps through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Walk {
    /// Every live entry.
    All,
    /// Live entries for key.
    Key(Vec<u8>),
    /// Live entries with keys between the bounds, in key order.
    Range(Bound<Vec<u8>>, Bound<Vec<u8>>),
}

impl Walk {
    pub fn range(low: Bound<&[u8]>, high: Bound<&[u8]>) -> Walk {
        Walk::Range(to_owned_bound(low), to_owned_bound(high))
    }

    /// Take the next step on `index`.
    pub fn step<I>(&self, index: &mut I, cursor: &mut Cursor) -> Result<Option<Entry>>
    where
        I: Index + ?Sized,
    {
        match self {
            Walk::All => index.next_all(cursor),
            Walk::Key(key) => index.next_many(key, cursor),
            Walk::Range(low, high) => index.next_between(as_bound(low), as_bound(high), cursor),
        }
    }
}

pub fn to_owned_bound(bound: Bound<&[u8]>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(key) => Bound::Included(key.to_vec()),
        Bound::Excluded(key) => Bound::Excluded(key.to_vec()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

pub fn as_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_slice()),
        Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Iterator over index entries, taking one [Walk] step at a time.
pub struct Steps<'a, I: ?Sized> {
    index: &'a mut I,
    walk: Walk,
    cursor: Cursor,
}

impl<'a, I: ?Sized> Steps<'a, I> {
    pub fn new(index: &'a mut I, walk: Walk, cursor: Cursor) -> Steps<'a, I> {
        Steps {
            index,
            walk,
            cursor,
        }
    }
}

impl<'a, I> Iterator for Steps<'a, I>
where
    I: Index + ?Sized,
{
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_exhausted() {
            return None;
        }

        match self.walk.step(self.index, &mut self.cursor) {
            Ok(Some(entry)) => Some(Ok(entry)),
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

/// Contract for every index type.
pub trait Index: Send {
    /// Return the index name.
    fn to_name(&self) -> String;

    /// Return the persisted parameters, as read from the header.
    fn to_params(&self) -> Params;

    /// First time setup, create the bucket file with header and storage.
    fn create_index(&mut self) -> Result<()>;

    /// Open an existing index, fails if bucket file is missing.
    fn open_index(&mut self) -> Result<()>;

    /// Flush, fsync and close the index.
    fn close_index(&mut self) -> Result<()>;

    /// Close the index and remove its files from disk.
    fn destroy(&mut self) -> Result<()>;

    /// Best effort flush, never fails.
    fn flush(&mut self);

    /// Best effort fsync, never fails.
    fn fsync(&mut self);

    /// Rewrite index and storage, dropping deleted entries and stale
    /// values.
    fn compact(&mut self) -> Result<()>;

    /// Compact the index into `hash_lim + 1` slots. Only hash indexes can
    /// be rehashed.
    fn rehash(&mut self, _hash_lim: u64) -> Result<()> {
        err_at!(NotImplemented, msg: "{:?} cannot be rehashed", self.to_name())
    }

    /// Update the persisted header parameters using `f`. Fails if the
    /// updated header does not fit, leaving the header untouched.
    fn save_params(&mut self, f: &mut dyn FnMut(&mut Params)) -> Result<()>;

    fn insert(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()>;

    fn update(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()>;

    /// Return the first live entry for `key`.
    fn get(&mut self, key: &[u8]) -> Result<Entry>;

    fn delete(&mut self, key: &[u8], doc_id: &[u8], start: u64, size: u64) -> Result<()>;

    /// Step through every live entry.
    fn next_all(&mut self, cursor: &mut Cursor) -> Result<Option<Entry>>;

    /// Step through live entries matching `key`.
    fn next_many(&mut self, key: &[u8], cursor: &mut Cursor) -> Result<Option<Entry>>;

    /// Step through live entries whose key falls between `low` and
    /// `high`, in key order. Only ordered indexes support range scans.
    fn next_between(
        &mut self,
        _low: Bound<&[u8]>,
        _high: Bound<&[u8]>,
        _cursor: &mut Cursor,
    ) -> Result<Option<Entry>> {
        err_at!(NotImplemented, msg: "{:?} cannot scan ranges", self.to_name())
    }

    /// Normalize, and validate, key supplied by the application.
    fn make_key(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Derive `(key, value)` from a document. None if the document
    /// shall not be indexed.
    fn make_key_value(&self, doc: &Doc) -> Result<Option<(Vec<u8>, Vec<u8>)>>;

    /// Derive every `(key, value)` from a document, for indexes that
    /// index a document under many keys. Keys are unique.
    fn make_keys_values(&self, doc: &Doc) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.make_key_value(doc)?.into_iter().collect())
    }

    /// Generate a fresh key.
    fn create_key(&mut self) -> Result<Vec<u8>>;

    /// Storage for this index.
    fn storage(&mut self) -> Result<&mut dyn Storage>;

    fn clear_cache(&mut self);

    /// Lazy scan over every live entry, skipping the first `start_pos`
    /// entries.
    fn all(&mut self, start_pos: usize) -> Box<dyn Iterator<Item = Result<Entry>> + '_> {
        Box::new(Steps::new(self, Walk::All, Cursor::new(start_pos, 0)))
    }

    /// Lazy scan over live entries for `key`, skipping `start_from`
    /// entries, and returning at most `limit` entries, ZERO for
    /// unlimited.
    fn get_many(
        &mut self,
        key: &[u8],
        start_from: Option<usize>,
        limit: usize,
    ) -> Box<dyn Iterator<Item = Result<Entry>> + '_> {
        let cursor = Cursor::new(start_from.unwrap_or(0), limit);
        Box::new(Steps::new(self, Walk::Key(key.to_vec()), cursor))
    }

    /// Lazy scan over live entries with keys between `low` and `high`,
    /// in key order. Skip `start_from` entries, and return at most
    /// `limit` entries, ZERO for unlimited.
    fn get_between(
        &mut self,
        low: Bound<&[u8]>,
        high: Bound<&[u8]>,
        start_from: Option<usize>,
        limit: usize,
    ) -> Box<dyn Iterator<Item = Result<Entry>> + '_> {
        let cursor = Cursor::new(start_from.unwrap_or(0), limit);
        Box::new(Steps::new(self, Walk::range(low, high), cursor))
    }

    /// Storage where values for `key` are kept.
    fn shard_storage(&mut self, _key: &[u8]) -> Result<&mut dyn Storage> {
        self.storage()
    }

    /// Store `value` in the key's storage and insert the entry.
    fn insert_with_storage(&mut self, key: &[u8], doc_id: &[u8], value: &[u8]) -> Result<()> {
        let (start, size) = match value.is_empty() {
            true => EMPTY_VALUE,
            false => self.shard_storage(key)?.insert(value)?,
        };
        self.insert(key, doc_id, start, size)
    }

    /// Store `value` in the key's storage and update the entry.
    fn update_with_storage(&mut self, key: &[u8], doc_id: &[u8], value: &[u8]) -> Result<()> {
        let (start, size) = match value.is_empty() {
            true => EMPTY_VALUE,
            false => self.shard_storage(key)?.insert(value)?,
        };
        self.update(key, doc_id, start, size)
    }

    /// Read back the value for an entry.
    fn read_value(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        match entry.is_empty_value() {
            true => Ok(vec![]),
            false => self.shard_storage(&entry.key)?.get(entry.start, entry.size),
        }
    }
}
