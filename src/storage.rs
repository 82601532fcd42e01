//! Module implement the storage collaborator for indexes.
//!
//! Indexes do not hold document values, they hold `(start, size)`
//! pointers into a [Storage]. [FileStorage] is an append-only file, values
//! are never modified in place, updates append a new copy and deletes
//! leave the old copy behind, until the owning index is compacted.

use lazy_static::lazy_static;
use log::debug;

use std::{ffi, fs, io::Write, path};

use crate::{index::files::to_storage_location, util, Error, Result};

lazy_static! {
    /// Every storage file begin with this marker, hence no value can
    /// start at offset `1`, which is reserved for empty values.
    pub static ref STORAGE_MARKER: Vec<u8> = {
        let marker = "bucketdb-storage-0.0.1";
        marker.as_bytes().to_vec()
    };
}

/// Storage collaborator, where the document values are kept.
pub trait Storage: Send {
    /// Create a fresh storage, fails if already exists.
    fn create(&mut self) -> Result<()>;

    /// Open an existing storage.
    fn open(&mut self) -> Result<()>;

    /// Append `value`, return its `(start, size)`.
    fn insert(&mut self, value: &[u8]) -> Result<(u64, u64)>;

    /// Read back a value stored at `(start, size)`.
    fn get(&mut self, start: u64, size: u64) -> Result<Vec<u8>>;

    fn flush(&mut self) -> Result<()>;

    fn fsync(&mut self) -> Result<()>;

    /// Close the storage, can be re-opened later.
    fn close(&mut self) -> Result<()>;

    /// Close and remove the storage from disk.
    fn destroy(&mut self) -> Result<()>;

    /// Return the storage location.
    fn to_location(&self) -> ffi::OsString;
}

/// Append only value file, `<dir>/<name>_stor`.
pub struct FileStorage {
    loc: ffi::OsString,
    fd: Option<fs::File>,
    fpos: u64,
}

impl FileStorage {
    pub fn new(dir: &ffi::OsStr, name: &str) -> FileStorage {
        FileStorage {
            loc: to_storage_location(dir, name),
            fd: None,
            fpos: 0,
        }
    }

    /// Return the number of bytes in storage, including the marker.
    pub fn len(&self) -> u64 {
        self.fpos
    }

    pub fn is_empty(&self) -> bool {
        self.fpos <= (STORAGE_MARKER.len() as u64)
    }

    fn as_mut_fd(&mut self) -> Result<&mut fs::File> {
        match self.fd.as_mut() {
            Some(fd) => Ok(fd),
            None => err_at!(IndexFail, msg: "storage {:?} not open", self.loc),
        }
    }
}

impl Storage for FileStorage {
    fn create(&mut self) -> Result<()> {
        let mut fd = util::create_file_rw(&self.loc)?;
        util::write_at(&mut fd, 0, &STORAGE_MARKER)?;
        self.fpos = STORAGE_MARKER.len() as u64;
        self.fd = Some(fd);

        debug!(target: "bucketdb", "created storage {:?}", self.loc);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        let mut fd = util::open_file_rw(&self.loc)?;
        match util::read_at(&mut fd, 0, STORAGE_MARKER.len())? {
            Some(marker) if marker == STORAGE_MARKER.as_slice() => (),
            _ => err_at!(InvalidFile, msg: "bad storage marker {:?}", self.loc)?,
        }
        self.fpos = err_at!(IOError, fd.metadata())?.len();
        self.fd = Some(fd);
        Ok(())
    }

    fn insert(&mut self, value: &[u8]) -> Result<(u64, u64)> {
        let fpos = self.fpos;
        let fd = self.as_mut_fd()?;
        util::write_at(fd, fpos, value)?;
        self.fpos += value.len() as u64;
        Ok((fpos, value.len() as u64))
    }

    fn get(&mut self, start: u64, size: u64) -> Result<Vec<u8>> {
        let (marker_len, fpos) = (STORAGE_MARKER.len() as u64, self.fpos);
        let end = match start.checked_add(size) {
            Some(end) => end,
            None => err_at!(InvalidInput, msg: "value overflow {}:{}", start, size)?,
        };
        if start < marker_len || end > fpos {
            err_at!(InvalidInput, msg: "value out of range {}:{}/{}", start, size, fpos)?
        }
        let n = err_at!(FailConvert, usize::try_from(size))?;
        match util::read_at(self.as_mut_fd()?, start, n)? {
            Some(value) => Ok(value),
            None => err_at!(Fatal, msg: "missing value at {}", start),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self.fd.as_mut() {
            Some(fd) => err_at!(IOError, fd.flush()),
            None => Ok(()),
        }
    }

    fn fsync(&mut self) -> Result<()> {
        match self.fd.as_mut() {
            Some(fd) => err_at!(IOError, fd.sync_all()),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.fd.is_some() {
            self.flush()?;
            self.fsync()?;
        }
        self.fd = None;
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.fd = None;
        if path::Path::new(&self.loc).exists() {
            debug!(target: "bucketdb", "destroy storage {:?}", self.loc);
        }
        util::purge_file(&self.loc)
    }

    fn to_location(&self) -> ffi::OsString {
        self.loc.clone()
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;
