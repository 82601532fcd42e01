use std::{ffi, fmt, path, result};

use crate::{util, Error, Result};

/// Bucket file is uniquely locatable by providing the `dir` and index name.
/// `format!("{}_buck", name)`
#[derive(Clone)]
pub struct BucketFileName(pub ffi::OsString);

impl From<String> for BucketFileName {
    fn from(name: String) -> BucketFileName {
        let file_name = format!("{}_buck", name);
        BucketFileName(AsRef::<ffi::OsStr>::as_ref(&file_name).to_os_string())
    }
}

impl TryFrom<BucketFileName> for String {
    type Error = Error;

    fn try_from(fname: BucketFileName) -> Result<String> {
        strip_name(&fname.0, "_buck")
    }
}

impl From<BucketFileName> for ffi::OsString {
    fn from(name: BucketFileName) -> ffi::OsString {
        name.0
    }
}

impl fmt::Display for BucketFileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self.0.to_str() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Storage file holding values, paired with a bucket file.
/// `format!("{}_stor", name)`
#[derive(Clone)]
pub struct StorageFileName(pub ffi::OsString);

impl From<String> for StorageFileName {
    fn from(name: String) -> StorageFileName {
        let file_name = format!("{}_stor", name);
        StorageFileName(AsRef::<ffi::OsStr>::as_ref(&file_name).to_os_string())
    }
}

impl TryFrom<StorageFileName> for String {
    type Error = Error;

    fn try_from(fname: StorageFileName) -> Result<String> {
        strip_name(&fname.0, "_stor")
    }
}

impl From<StorageFileName> for ffi::OsString {
    fn from(name: StorageFileName) -> ffi::OsString {
        name.0
    }
}

impl fmt::Display for StorageFileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self.0.to_str() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Return the bucket file location for index `name` under `dir`.
pub fn to_bucket_location(dir: &ffi::OsStr, name: &str) -> ffi::OsString {
    util::to_location(dir, &BucketFileName::from(name.to_string()).to_string())
}

/// Return the storage file location for index `name` under `dir`.
pub fn to_storage_location(dir: &ffi::OsStr, name: &str) -> ffi::OsString {
    util::to_location(dir, &StorageFileName::from(name.to_string()).to_string())
}

/// Remove the bucket file and the storage file of index `name`, return
/// true if any of them existed.
pub fn purge_index_files(dir: &ffi::OsStr, name: &str) -> Result<bool> {
    let buck = to_bucket_location(dir, name);
    let stor = to_storage_location(dir, name);
    let found = path::Path::new(&buck).exists() || path::Path::new(&stor).exists();
    util::purge_file(&buck)?;
    util::purge_file(&stor)?;
    Ok(found)
}

/// Name used while compacting index `name`.
pub fn to_compact_name(name: &str) -> String {
    format!("{}_compact", name)
}

fn strip_name(fname: &ffi::OsStr, suffix: &str) -> Result<String> {
    let ffpp = path::Path::new(fname);
    let name = || -> Option<&str> {
        let fname = ffpp.file_name()?.to_str()?;
        fname.strip_suffix(suffix)
    }();

    match name {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => err_at!(InvalidFile, msg: "{:?}", ffpp),
    }
}

#[cfg(test)]
#[path = "files_test.rs"]
mod files_test;
