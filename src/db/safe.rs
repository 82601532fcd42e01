use log::debug;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use std::{cell::RefCell, collections::HashSet, ops::Bound, sync::Arc};

use crate::{
    db::{Db, Doc, Record},
    index::{Cursor, Index, Walk},
    Error, Result,
};

struct State<D> {
    db: D,
    // indexes whose scans are served by this wrapper.
    patched: HashSet<String>,
}

impl<D> State<D>
where
    D: Db,
{
    fn patch(&mut self) {
        let names = self.db.to_index_names();
        debug!(target: "bucketdb", "patch scans for {:?}", names);
        self.patched.extend(names);
    }
}

/// Serialize every operation on a database through a single re-entrant
/// lock.
///
/// Each call takes the lock for its whole duration. A thread can keep the
/// lock across several calls using [SafeDatabase::hold]. Scans returned
/// by [SafeDatabase::all], [SafeDatabase::get_many] and
/// [SafeDatabase::get_between] take the lock for every step, hence other
/// threads can interleave between steps.
///
/// [SafeDatabase::flush] and [SafeDatabase::flush_indexes] never wait
/// for the lock, if the lock is busy the flush is skipped and they
/// return false. Callers that need the data on disk shall check the
/// returned flag, or use [SafeDatabase::fsync] which waits for the lock.
pub struct SafeDatabase<D> {
    inner: Arc<ReentrantMutex<RefCell<State<D>>>>,
}

impl<D> Clone for SafeDatabase<D> {
    fn clone(&self) -> Self {
        SafeDatabase {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Guard returned by [SafeDatabase::hold], lock is released on drop.
pub struct Hold<'a, D> {
    _guard: ReentrantMutexGuard<'a, RefCell<State<D>>>,
}

impl<D> SafeDatabase<D>
where
    D: Db,
{
    pub fn new(db: D) -> SafeDatabase<D> {
        let state = State {
            db,
            patched: HashSet::default(),
        };
        SafeDatabase {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(state))),
        }
    }

    /// Return the wrapped database, if this is the last reference.
    pub fn into_inner(self) -> Option<D> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => Some(inner.into_inner().into_inner().db),
            Err(_) => None,
        }
    }

    /// Keep the lock for a batch of calls from this thread.
    pub fn hold(&self) -> Hold<'_, D> {
        Hold {
            _guard: self.inner.lock(),
        }
    }

    fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut State<D>) -> Result<T>,
    {
        let guard = self.inner.lock();
        let mut state = err_at!(Fatal, guard.try_borrow_mut(), "nested database call")?;
        f(&mut state)
    }

    fn try_call<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut State<D>) -> Result<()>,
    {
        let guard = match self.inner.try_lock() {
            Some(guard) => guard,
            None => {
                debug!(target: "bucketdb", "flush skipped, database busy in another thread");
                return Ok(false);
            }
        };
        let res = match guard.try_borrow_mut() {
            Ok(mut state) => f(&mut state).map(|_| true),
            Err(_) => {
                debug!(target: "bucketdb", "flush skipped, database busy in this thread");
                Ok(false)
            }
        };
        res
    }

    pub fn create(&self) -> Result<()> {
        self.call(|s| {
            s.db.create()?;
            s.patch();
            Ok(())
        })
    }

    pub fn open(&self) -> Result<()> {
        self.call(|s| {
            s.db.open()?;
            s.patch();
            Ok(())
        })
    }

    pub fn close(&self) -> Result<()> {
        self.call(|s| {
            s.patched.clear();
            s.db.close()
        })
    }

    pub fn destroy(&self) -> Result<()> {
        self.call(|s| {
            s.patched.clear();
            s.db.destroy()
        })
    }

    pub fn is_opened(&self) -> bool {
        self.call(|s| Ok(s.db.is_opened())).unwrap_or(false)
    }

    pub fn add_index(&self, index: Box<dyn Index>) -> Result<String> {
        self.call(|s| {
            let name = s.db.add_index(index)?;
            s.patch();
            Ok(name)
        })
    }

    pub fn edit_index(&self, index: Box<dyn Index>, reindex: bool) -> Result<String> {
        self.call(|s| {
            let name = s.db.edit_index(index, reindex)?;
            s.patch();
            Ok(name)
        })
    }

    pub fn destroy_index(&self, name: &str) -> Result<()> {
        self.call(|s| {
            s.db.destroy_index(name)?;
            s.patched.remove(name);
            Ok(())
        })
    }

    pub fn reindex_index(&self, name: &str) -> Result<()> {
        self.call(|s| s.db.reindex_index(name))
    }

    pub fn compact_index(&self, name: &str) -> Result<()> {
        self.call(|s| s.db.compact_index(name))
    }

    pub fn rehash_index(&self, name: &str, hash_lim: u64) -> Result<()> {
        self.call(|s| s.db.rehash_index(name, hash_lim))
    }

    pub fn to_index_names(&self) -> Result<Vec<String>> {
        self.call(|s| Ok(s.db.to_index_names()))
    }

    pub fn insert(&self, doc: &Doc) -> Result<(String, String)> {
        self.call(|s| s.db.insert(doc))
    }

    pub fn update(&self, doc: &Doc) -> Result<(String, String)> {
        self.call(|s| s.db.update(doc))
    }

    pub fn delete(&self, doc: &Doc) -> Result<()> {
        self.call(|s| s.db.delete(doc))
    }

    pub fn get(&self, index_name: &str, key: &[u8]) -> Result<Record> {
        self.call(|s| s.db.get(index_name, key))
    }

    pub fn next_all(&self, index_name: &str, cursor: &mut Cursor) -> Result<Option<Record>> {
        self.call(|s| s.db.next_all(index_name, cursor))
    }

    pub fn next_many(
        &self,
        index_name: &str,
        key: &[u8],
        cursor: &mut Cursor,
    ) -> Result<Option<Record>> {
        self.call(|s| s.db.next_many(index_name, key, cursor))
    }

    pub fn next_between(
        &self,
        index_name: &str,
        low: Bound<&[u8]>,
        high: Bound<&[u8]>,
        cursor: &mut Cursor,
    ) -> Result<Option<Record>> {
        self.call(|s| s.db.next_between(index_name, low, high, cursor))
    }

    /// Flush, unless the lock is held elsewhere. Return whether flushed,
    /// a skipped flush is logged at debug level.
    pub fn flush(&self) -> Result<bool> {
        self.try_call(|s| s.db.flush())
    }

    /// Flush indexes, unless the lock is held elsewhere. Return whether
    /// flushed.
    pub fn flush_indexes(&self) -> Result<bool> {
        self.try_call(|s| s.db.flush_indexes())
    }

    pub fn fsync(&self) -> Result<()> {
        self.call(|s| s.db.fsync())
    }

    pub fn compact(&self) -> Result<()> {
        self.call(|s| s.db.compact())
    }

    pub fn reindex(&self) -> Result<()> {
        self.call(|s| s.db.reindex())
    }

    pub fn count(&self, index_name: &str) -> Result<usize> {
        self.call(|s| s.db.count(index_name))
    }

    /// Lazy scan over every record in index, skipping `start_pos`
    /// records. Lock is taken for every step.
    pub fn all(&self, index_name: &str, start_pos: usize) -> Result<SafeScan<D>> {
        self.scan(index_name, Walk::All, Cursor::new(start_pos, 0))
    }

    /// Lazy scan over records for `key`, skipping `start_from` records and
    /// returning at most `limit` records, ZERO for unlimited. Lock is
    /// taken for every step.
    pub fn get_many(
        &self,
        index_name: &str,
        key: &[u8],
        start_from: Option<usize>,
        limit: usize,
    ) -> Result<SafeScan<D>> {
        let cursor = Cursor::new(start_from.unwrap_or(0), limit);
        self.scan(index_name, Walk::Key(key.to_vec()), cursor)
    }

    /// Lazy scan over records with keys between `low` and `high`, in key
    /// order. Lock is taken for every step.
    pub fn get_between(
        &self,
        index_name: &str,
        low: Bound<&[u8]>,
        high: Bound<&[u8]>,
        start_from: Option<usize>,
        limit: usize,
    ) -> Result<SafeScan<D>> {
        let cursor = Cursor::new(start_from.unwrap_or(0), limit);
        self.scan(index_name, Walk::range(low, high), cursor)
    }

    fn scan(&self, index_name: &str, walk: Walk, cursor: Cursor) -> Result<SafeScan<D>> {
        self.call(|s| check_patched(&s.patched, index_name))?;
        Ok(SafeScan {
            inner: Arc::clone(&self.inner),
            index_name: index_name.to_string(),
            walk,
            cursor,
        })
    }
}

fn check_patched(patched: &HashSet<String>, index_name: &str) -> Result<()> {
    match patched.contains(index_name) {
        true => Ok(()),
        false => err_at!(IndexNotFound, msg: "index {:?} not available for scan", index_name),
    }
}

/// Iterator over records, returned by [SafeDatabase::all],
/// [SafeDatabase::get_many] and [SafeDatabase::get_between]. Holds a
/// reference to the shared database, and takes the lock on every step.
pub struct SafeScan<D> {
    inner: Arc<ReentrantMutex<RefCell<State<D>>>>,
    index_name: String,
    walk: Walk,
    cursor: Cursor,
}

impl<D> SafeScan<D>
where
    D: Db,
{
    fn step(&mut self) -> Result<Option<Record>> {
        let guard = self.inner.lock();
        let mut state = err_at!(Fatal, guard.try_borrow_mut(), "nested database call")?;
        check_patched(&state.patched, &self.index_name)?;

        state.db.next_walk(&self.index_name, &self.walk, &mut self.cursor)
    }
}

impl<D> Iterator for SafeScan<D>
where
    D: Db,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_exhausted() {
            return None;
        }

        match self.step() {
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

#[cfg(test)]
#[path = "safe_test.rs"]
mod safe_test;
