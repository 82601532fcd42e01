use fs2::FileExt;
use log::{debug, info, warn};

use std::{ffi, fs, io::Write, path};

use crate::{
    index::{files::to_bucket_location, Params},
    storage::Storage,
    util, Error, Result,
};

/// Shared lifecycle for every index type.
///
/// Base owns the bucket file, `<dir>/<name>_buck`, and the index's
/// storage. Bucket file begin with a header of `start_ind` bytes holding
/// the [Params], rest of the file is owned by the concrete index.
pub struct Base {
    dir: ffi::OsString,
    start_ind: u64,
    params: Params,
    fd: Option<fs::File>,
    storage: Box<dyn Storage>,
}

impl Base {
    pub fn new(dir: &ffi::OsStr, params: Params, start_ind: u64, storage: Box<dyn Storage>) -> Base {
        Base {
            dir: dir.to_os_string(),
            start_ind,
            params,
            fd: None,
            storage,
        }
    }

    pub fn to_dir(&self) -> ffi::OsString {
        self.dir.clone()
    }

    pub fn to_name(&self) -> String {
        self.params.name.clone()
    }

    pub fn to_start_ind(&self) -> u64 {
        self.start_ind
    }

    pub fn as_params(&self) -> &Params {
        &self.params
    }

    /// Return the bucket file location.
    pub fn to_location(&self) -> ffi::OsString {
        to_bucket_location(&self.dir, &self.params.name)
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    pub fn as_mut_fd(&mut self) -> Result<&mut fs::File> {
        match self.fd.as_mut() {
            Some(fd) => Ok(fd),
            None => err_at!(IndexFail, msg: "index {:?} not open", self.params.name),
        }
    }

    pub fn as_mut_storage(&mut self) -> &mut dyn Storage {
        self.storage.as_mut()
    }

    /// Create bucket file, write the header, and reserve `data_len`
    /// zeroed bytes after the header. Also create the storage.
    pub fn create_file(&mut self, data_len: u64) -> Result<()> {
        let loc = self.to_location();
        if path::Path::new(&loc).exists() {
            err_at!(IndexFail, msg: "index {:?} already exists", loc)?
        }

        let header = self.params.to_header(self.start_ind)?;
        let mut fd = util::create_file_rw(&loc)?;
        util::write_at(&mut fd, 0, &header)?;

        let len = self.start_ind + data_len;
        err_at!(IOError, fd.allocate(len), "allocate {:?}", loc)?;
        err_at!(IOError, fd.set_len(len), "allocate {:?}", loc)?;

        self.storage.create()?;
        self.fd = Some(fd);

        info!(
            target: "bucketdb",
            "{:?}, created {} index at {:?}", self.params.name, self.params.kind, loc
        );
        Ok(())
    }

    /// Open an existing bucket file and its storage.
    pub fn open_file(&mut self) -> Result<()> {
        let loc = self.to_location();
        if !path::Path::new(&loc).is_file() {
            err_at!(IndexFail, msg: "index {:?} doesn't exist", loc)?
        }

        let mut fd = util::open_file_rw(&loc)?;
        let params = read_params(&mut fd, self.start_ind)?;
        if params.name != self.params.name || params.kind != self.params.kind {
            err_at!(
                IndexFail, msg: "header mismatch {}/{} in {:?}", params.name, params.kind, loc
            )?
        }

        self.storage.open()?;
        self.params = params;
        self.fd = Some(fd);

        debug!(target: "bucketdb", "{:?}, opened index {:?}", self.params.name, loc);
        Ok(())
    }

    /// Apply `f` to the on-disk parameters and write them back. Fails if
    /// the updated header won't fit within `start_ind`, in which case the
    /// bucket file is left untouched.
    pub fn save_params(&mut self, f: &mut dyn FnMut(&mut Params)) -> Result<()> {
        let start_ind = self.start_ind;
        let fd = self.as_mut_fd()?;

        let mut params = read_params(fd, start_ind)?;
        f(&mut params);
        let header = params.to_header(start_ind)?;
        util::write_at(fd, 0, &header)?;

        self.params = params;
        Ok(())
    }

    /// Best effort, errors are logged and ignored.
    pub fn flush(&mut self) {
        if let Some(fd) = self.fd.as_mut() {
            if let Err(err) = fd.flush() {
                warn!(target: "bucketdb", "{:?}, flush failed {}", self.params.name, err);
            }
        }
        if let Err(err) = self.storage.flush() {
            warn!(target: "bucketdb", "{:?}, storage flush failed {}", self.params.name, err);
        }
    }

    /// Best effort, errors are logged and ignored.
    pub fn fsync(&mut self) {
        if let Some(fd) = self.fd.as_mut() {
            if let Err(err) = fd.sync_all() {
                warn!(target: "bucketdb", "{:?}, fsync failed {}", self.params.name, err);
            }
        }
        if let Err(err) = self.storage.fsync() {
            warn!(target: "bucketdb", "{:?}, storage fsync failed {}", self.params.name, err);
        }
    }

    /// Flush, fsync and close the bucket file and the storage.
    pub fn close(&mut self) -> Result<()> {
        if self.fd.is_some() {
            self.flush();
            self.fsync();
        }
        self.fd = None;
        self.storage.close()
    }

    /// Close and remove the bucket file and the storage from disk.
    pub fn destroy(&mut self) -> Result<()> {
        self.fd = None;
        let loc = self.to_location();
        util::purge_file(&loc)?;
        self.storage.destroy()?;

        info!(target: "bucketdb", "{:?}, destroyed index {:?}", self.params.name, loc);
        Ok(())
    }

    /// Drop the file handles, without flushing, so that files can be
    /// moved around.
    pub fn release(&mut self) -> Result<()> {
        self.fd = None;
        self.storage.close()
    }

    /// Release this index's files and move `buck` and `stor` over them.
    /// Caller shall re-open the index.
    pub fn replace_files(&mut self, buck: &ffi::OsStr, stor: &ffi::OsStr) -> Result<()> {
        self.release()?;

        let loc = self.to_location();
        err_at!(IOError, fs::rename(buck, &loc), "move {:?}", buck)?;
        let loc = self.storage.to_location();
        err_at!(IOError, fs::rename(stor, &loc), "move {:?}", stor)?;
        Ok(())
    }
}

fn read_params(fd: &mut fs::File, start_ind: u64) -> Result<Params> {
    let n = err_at!(FailConvert, usize::try_from(start_ind))?;
    match util::read_at(fd, 0, n)? {
        Some(header) => Params::from_header(&header),
        None => err_at!(IndexFail, msg: "missing header"),
    }
}

#[cfg(test)]
#[path = "base_test.rs"]
mod base_test;
