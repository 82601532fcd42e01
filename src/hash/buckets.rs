use log::{info, warn};

use std::ffi;

use crate::{
    hash::{
        check_hash_lim, hash_key,
        record::{Layout, Record, SLOT_SIZE},
        Config,
    },
    index::{
        files::{purge_index_files, to_bucket_location, to_storage_location},
        Base, Cursor, Entry, Index, Params,
    },
    storage::Storage,
    util, Error, Result,
};

/// Bucket file shared by hash indexes, slots followed by chained records.
pub struct Buckets {
    pub base: Base,
    hash_lim: u64,
    layout: Layout,
}

impl Buckets {
    pub fn new(config: &Config, kind: &str, storage: Box<dyn Storage>) -> Result<Buckets> {
        let layout = Layout::new(config.key_size, config.id_size)?;
        check_hash_lim(config.hash_lim)?;

        let mut params = Params::new(&config.name, kind);
        params.hash_lim = config.hash_lim;
        params.key_size = config.key_size as u64;
        params.id_size = config.id_size as u64;
        let base = Base::new(&config.dir, params, config.start_ind, storage);

        Ok(Buckets {
            base,
            hash_lim: config.hash_lim,
            layout,
        })
    }

    pub fn as_layout(&self) -> &Layout {
        &self.layout
    }

    /// File position where records start.
    pub fn to_data_start(&self) -> u64 {
        self.base.to_start_ind() + ((self.hash_lim + 1) * SLOT_SIZE)
    }

    pub fn create(&mut self) -> Result<()> {
        self.base.create_file((self.hash_lim + 1) * SLOT_SIZE)
    }

    /// Open bucket file, persisted parameters take precedence over
    /// configured values.
    pub fn open(&mut self) -> Result<()> {
        self.base.open_file()?;

        let params = self.base.as_params();
        let key_size = err_at!(FailConvert, usize::try_from(params.key_size))?;
        let id_size = err_at!(FailConvert, usize::try_from(params.id_size))?;
        check_hash_lim(params.hash_lim)?;
        self.layout = Layout::new(key_size, id_size)?;
        self.hash_lim = params.hash_lim;
        Ok(())
    }

    pub fn to_hash_lim(&self) -> u64 {
        self.hash_lim
    }

    fn to_slot_pos(&self, key: &[u8]) -> u64 {
        let slot = hash_key(key) & self.hash_lim;
        self.base.to_start_ind() + (slot * SLOT_SIZE)
    }

    /// Return position of the first record chained to key's slot, ZERO
    /// if slot is empty.
    pub fn read_head(&mut self, key: &[u8]) -> Result<u64> {
        let fpos = self.to_slot_pos(key);
        match util::read_at(self.base.as_mut_fd()?, fpos, SLOT_SIZE as usize)? {
            Some(buf) => Ok(u64::from_be_bytes(err_at!(FailConvert, buf[..].try_into())?)),
            None => err_at!(IndexFail, msg: "slot {} beyond file", fpos),
        }
    }

    pub fn write_head(&mut self, key: &[u8], pos: u64) -> Result<()> {
        let fpos = self.to_slot_pos(key);
        util::write_at(self.base.as_mut_fd()?, fpos, &pos.to_be_bytes())?;
        Ok(())
    }

    pub fn read_record(&mut self, pos: u64) -> Result<Record> {
        let n = self.layout.to_record_size();
        match util::read_at(self.base.as_mut_fd()?, pos, n)? {
            Some(buf) => self.layout.decode(&buf),
            None => err_at!(IndexFail, msg: "record at {} beyond file", pos),
        }
    }

    pub fn write_record(&mut self, pos: u64, r: &Record) -> Result<()> {
        let buf = self.layout.encode(r)?;
        util::write_at(self.base.as_mut_fd()?, pos, &buf)?;
        Ok(())
    }

    /// Append record to the file, return its position.
    pub fn append_record(&mut self, r: &Record) -> Result<u64> {
        let buf = self.layout.encode(r)?;
        let data_start = self.to_data_start();
        let fd = self.base.as_mut_fd()?;
        let fpos = util::append(fd, &buf)?;
        if fpos < data_start {
            err_at!(Fatal, msg: "record at {} within slots {}", fpos, data_start)
        } else {
            Ok(fpos)
        }
    }

    /// Append a new record at the tail of key's chain.
    pub fn link_record(&mut self, r: &Record, tail: Option<(u64, Record)>) -> Result<u64> {
        let pos = self.append_record(r)?;
        match tail {
            Some((tail_pos, mut tail)) => {
                tail.next = pos;
                self.write_record(tail_pos, &tail)?;
            }
            None => self.write_head(&r.key, pos)?,
        }
        Ok(pos)
    }

    /// Walk the chain for `key`, return the first record, and its
    /// position, for which `f` returns true. Also return the chain's
    /// tail, if slot is not empty.
    pub fn find<F>(&mut self, key: &[u8], mut f: F) -> Result<Found>
    where
        F: FnMut(&Record) -> bool,
    {
        let mut pos = self.read_head(key)?;
        if pos == 0 {
            return Ok(Found::Empty);
        }
        loop {
            let r = self.read_record(pos)?;
            if f(&r) {
                break Ok(Found::Hit(pos, r));
            } else if r.next == 0 {
                break Ok(Found::Miss(pos, r));
            }
            pos = r.next;
        }
    }

    /// Return the record at `ordinal`, counting from the first record in
    /// the file, None beyond the last record.
    pub fn read_nth(&mut self, ordinal: u64) -> Result<Option<Record>> {
        let n = self.layout.to_record_size();
        let fpos = self.to_data_start() + (ordinal * (n as u64));
        match util::read_at(self.base.as_mut_fd()?, fpos, n)? {
            Some(buf) => Ok(Some(self.layout.decode(&buf)?)),
            None => Ok(None),
        }
    }

    /// Step through live records in file order, cursor position is the
    /// record ordinal.
    pub fn next_live(&mut self, cursor: &mut Cursor) -> Result<Option<Entry>> {
        while !cursor.is_exhausted() {
            match self.read_nth(cursor.pos)? {
                Some(r) => {
                    cursor.pos += 1;
                    if r.is_live() && cursor.admit() {
                        return Ok(Some(r.to_entry()));
                    }
                }
                None => cursor.done = true,
            }
        }
        Ok(None)
    }

    /// Step through live records chained to `key`, cursor position is the
    /// next record in chain.
    pub fn next_chained(&mut self, key: &[u8], cursor: &mut Cursor) -> Result<Option<Entry>> {
        while !cursor.is_exhausted() {
            let pos = match cursor.pos {
                0 => self.read_head(key)?,
                pos => pos,
            };
            if pos == 0 {
                cursor.done = true;
                break;
            }

            let r = self.read_record(pos)?;
            match r.next {
                0 => cursor.done = true,
                next => cursor.pos = next,
            }
            if r.key == key && r.is_live() && cursor.admit() {
                return Ok(Some(r.to_entry()));
            }
        }
        Ok(None)
    }

    /// Copy live entries, and their values, into `other`.
    pub fn copy_live(&mut self, other: &mut dyn Index) -> Result<usize> {
        let mut cursor = Cursor::default();
        let mut n = 0;
        while let Some(entry) = self.next_live(&mut cursor)? {
            let value = match entry.is_empty_value() {
                true => vec![],
                false => self.base.as_mut_storage().get(entry.start, entry.size)?,
            };
            other.insert_with_storage(&entry.key, &entry.doc_id, &value)?;
            n += 1;
        }
        Ok(n)
    }

    /// Copy live entries into `other`, a fresh index under a scratch
    /// name, and move its files over this index's files. Return the
    /// number of entries copied.
    ///
    /// Scratch files left behind by an earlier compaction are purged
    /// first, and scratch files of a failed compaction are purged before
    /// returning the error. This index is untouched until the copy is
    /// complete.
    pub fn compact_into(&mut self, other: &mut dyn Index) -> Result<usize> {
        let (dir, name) = (self.base.to_dir(), self.base.to_name());
        let scratch = other.to_name();
        if purge_index_files(&dir, &scratch)? {
            warn!(target: "bucketdb", "{:?}, purged stale {:?} files", name, scratch);
        }

        let res = || -> Result<usize> {
            other.create_index()?;
            let n = self.copy_live(&mut *other)?;
            other.save_params(&mut |p: &mut Params| p.name = name.clone())?;
            other.close_index()?;
            Ok(n)
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
        self.replace_with(&buck, &stor)?;
        Ok(n)
    }

    /// Move files from a compacted copy over this index's files, and
    /// re-open.
    pub fn replace_with(&mut self, buck: &ffi::OsStr, stor: &ffi::OsStr) -> Result<()> {
        self.base.replace_files(buck, stor)?;
        self.open()?;

        info!(target: "bucketdb", "{:?}, replaced by {:?}", self.base.to_name(), buck);
        Ok(())
    }
}

/// Result of walking a bucket chain.
pub enum Found {
    /// Slot is empty.
    Empty,
    /// Matching record, and its position.
    Hit(u64, Record),
    /// No match, chain's tail and its position.
    Miss(u64, Record),
}

#[cfg(test)]
#[path = "buckets_test.rs"]
mod buckets_test;
