//! Module implement common utility functions and types.

use cbordata::{Cbor, FromCbor, IntoCbor};

use std::{
    ffi, fs,
    io::{Read, Seek, SeekFrom, Write},
    path,
};

use crate::{Error, Result};

/// Helper function to serialize value `T` implementing IntoCbor, into byte-string.
pub fn into_cbor_bytes<T>(val: T) -> Result<Vec<u8>>
where
    T: IntoCbor,
{
    let mut data: Vec<u8> = vec![];
    let n = err_at!(
        FailCbor,
        err_at!(FailCbor, val.into_cbor())?.encode(&mut data)
    )?;
    if n != data.len() {
        err_at!(Fatal, msg: "cbor encoding len mistmatch {} {}", n, data.len())
    } else {
        Ok(data)
    }
}

/// Helper function to deserialize value `T` implementing FromCbor, from byte-string.
/// Return (value, bytes-consumed)
pub fn from_cbor_bytes<T>(mut data: &[u8]) -> Result<(T, usize)>
where
    T: FromCbor,
{
    let (val, n) = err_at!(FailCbor, Cbor::decode(&mut data))?;
    Ok((err_at!(FailCbor, T::from_cbor(val))?, n))
}

/// Compose `<dir>/<file_name>`.
pub fn to_location(dir: &ffi::OsStr, file_name: &str) -> ffi::OsString {
    let loc: path::PathBuf = [dir.to_os_string(), ffi::OsString::from(file_name)]
        .iter()
        .collect();
    loc.into_os_string()
}

/// Create a fresh file for reading and writing. Parent directories are
/// created as needed. Fails if file already exist.
pub fn create_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    {
        let parent = match os_file.parent() {
            Some(parent) => Ok(parent),
            None => err_at!(InvalidFile, msg: "{:?}", file),
        }?;
        err_at!(IOError, fs::create_dir_all(parent))?;
    };

    let mut opts = fs::OpenOptions::new();
    err_at!(
        IOError,
        opts.read(true).write(true).create_new(true).open(os_file),
        "create {:?}",
        file
    )
}

/// Open existing file for reading and writing.
pub fn open_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    err_at!(
        IOError,
        opts.read(true).write(true).open(os_file),
        "open {:?}",
        file
    )
}

/// Read exactly `n` bytes from file-position `fpos`. Return None when
/// the file is shorter.
pub fn read_at(fd: &mut fs::File, fpos: u64, n: usize) -> Result<Option<Vec<u8>>> {
    err_at!(IOError, fd.seek(SeekFrom::Start(fpos)))?;
    let mut buf = vec![0; n];
    let mut m = 0;
    while m < n {
        match err_at!(IOError, fd.read(&mut buf[m..]))? {
            0 => break,
            k => m += k,
        }
    }
    match m {
        m if m == n => Ok(Some(buf)),
        0 => Ok(None),
        m => err_at!(Fatal, msg: "partial-rd at {} {}/{}", fpos, m, n),
    }
}

/// Write `data` at file-position `fpos`.
pub fn write_at(fd: &mut fs::File, fpos: u64, data: &[u8]) -> Result<usize> {
    err_at!(IOError, fd.seek(SeekFrom::Start(fpos)))?;
    err_at!(IOError, fd.write_all(data))?;
    Ok(data.len())
}

/// Append `data` to the end of file, return the file-position where
/// data was written.
pub fn append(fd: &mut fs::File, data: &[u8]) -> Result<u64> {
    let fpos = err_at!(IOError, fd.seek(SeekFrom::End(0)))?;
    err_at!(IOError, fd.write_all(data))?;
    Ok(fpos)
}

/// Remove file, after acquiring an exclusive lock on it. Missing file is
/// not an error.
pub fn purge_file(file: &ffi::OsStr) -> Result<()> {
    use fs2::FileExt;

    if !path::Path::new(file).is_file() {
        return Ok(());
    }

    let fd = err_at!(IOError, fs::OpenOptions::new().read(true).open(file))?;
    match fd.try_lock_exclusive() {
        Ok(_) => {
            err_at!(IOError, fs::remove_file(file), "remove file {:?}", file)?;
            err_at!(IOError, fd.unlock(), "fail unlock {:?}", file)
        }
        Err(_) => err_at!(IndexFail, msg: "file {:?} locked", file),
    }
}

/// Return a random, 32 character, hex string.
pub fn random_hex_32() -> String {
    uuid::Uuid::new_v4().to_simple().to_string()
}
