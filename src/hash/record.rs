use crate::{
    index::{Entry, Status},
    Error, Result,
};

/// Width of a bucket slot, holding the file position of the first record
/// in the chain, ZERO for empty slot.
pub const SLOT_SIZE: u64 = 8;

/// Fixed width layout of bucket records.
///
/// ```text
/// klen:u8 | key:key_size | dlen:u8 | doc_id:id_size | start:u64 | size:u64 | status:u8 | next:u64
/// ```
///
/// Integers are encoded in big-endian, key and doc_id are zero padded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub key_size: usize,
    pub id_size: usize,
}

impl Layout {
    pub fn new(key_size: usize, id_size: usize) -> Result<Layout> {
        if key_size == 0 || key_size > 255 {
            err_at!(Preconditions, msg: "key_size {} out of range 1..=255", key_size)
        } else if id_size > 255 {
            err_at!(Preconditions, msg: "id_size {} out of range 0..=255", id_size)
        } else {
            Ok(Layout { key_size, id_size })
        }
    }

    /// Size of a single record, in bytes.
    pub fn to_record_size(&self) -> usize {
        1 + self.key_size + 1 + self.id_size + 8 + 8 + 1 + 8
    }

    pub fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() > self.key_size {
            err_at!(Preconditions, msg: "key too long {} > {}", key.len(), self.key_size)
        } else {
            Ok(())
        }
    }

    pub fn check_doc_id(&self, doc_id: &[u8]) -> Result<()> {
        if doc_id.len() > self.id_size {
            err_at!(Preconditions, msg: "doc_id too long {} > {}", doc_id.len(), self.id_size)
        } else {
            Ok(())
        }
    }

    pub fn encode(&self, r: &Record) -> Result<Vec<u8>> {
        self.check_key(&r.key)?;
        self.check_doc_id(&r.doc_id)?;

        let mut buf = Vec::with_capacity(self.to_record_size());
        buf.push(r.key.len() as u8);
        buf.extend_from_slice(&r.key);
        buf.resize(1 + self.key_size, 0);
        buf.push(r.doc_id.len() as u8);
        buf.extend_from_slice(&r.doc_id);
        buf.resize(1 + self.key_size + 1 + self.id_size, 0);
        buf.extend_from_slice(&r.start.to_be_bytes());
        buf.extend_from_slice(&r.size.to_be_bytes());
        buf.push(r.status.to_byte());
        buf.extend_from_slice(&r.next.to_be_bytes());

        Ok(buf)
    }

    pub fn decode(&self, buf: &[u8]) -> Result<Record> {
        if buf.len() != self.to_record_size() {
            err_at!(IndexFail, msg: "record size {} != {}", buf.len(), self.to_record_size())?
        }

        let (klen, buf) = (buf[0] as usize, &buf[1..]);
        if klen > self.key_size {
            err_at!(IndexFail, msg: "broken record, key len {}", klen)?
        }
        let (key, buf) = (buf[..klen].to_vec(), &buf[self.key_size..]);

        let (dlen, buf) = (buf[0] as usize, &buf[1..]);
        if dlen > self.id_size {
            err_at!(IndexFail, msg: "broken record, doc_id len {}", dlen)?
        }
        let (doc_id, buf) = (buf[..dlen].to_vec(), &buf[self.id_size..]);

        let start = u64::from_be_bytes(err_at!(FailConvert, buf[..8].try_into())?);
        let size = u64::from_be_bytes(err_at!(FailConvert, buf[8..16].try_into())?);
        let status = match Status::from_byte(buf[16]) {
            Some(status) => status,
            None => err_at!(IndexFail, msg: "broken record, status {}", buf[16])?,
        };
        let next = u64::from_be_bytes(err_at!(FailConvert, buf[17..25].try_into())?);

        Ok(Record {
            key,
            doc_id,
            start,
            size,
            status,
            next,
        })
    }
}

/// Bucket record, an [Entry] chained to the next record in its slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub doc_id: Vec<u8>,
    pub start: u64,
    pub size: u64,
    pub status: Status,
    pub next: u64,
}

impl Record {
    pub fn new(key: &[u8], doc_id: &[u8], start: u64, size: u64, next: u64) -> Record {
        Record {
            key: key.to_vec(),
            doc_id: doc_id.to_vec(),
            start,
            size,
            status: Status::Ok,
            next,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn to_entry(&self) -> Entry {
        Entry {
            key: self.key.clone(),
            doc_id: self.doc_id.clone(),
            start: self.start,
            size: self.size,
            status: self.status,
        }
    }
}

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;
