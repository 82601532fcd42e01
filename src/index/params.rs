use cbordata::Cborize;

use crate::{util, Error, Result};

const PARAMS_VER: u32 = 0x00010001;
const PARAM_VER: u32 = 0x00020001;

/// Default size, in bytes, reserved for the header at the beginning of a
/// bucket file.
pub const START_IND: u64 = 500;

/// Persisted index configuration, kept in the header of every bucket file.
///
/// Header is serialized in cbor format and zero padded to `start_ind`
/// bytes. It can never outgrow `start_ind`.
#[derive(Clone, Default, Debug, PartialEq, Cborize)]
pub struct Params {
    /// Index name, also the file-name prefix.
    pub name: String,
    /// Kind of index, `"hash"`, `"unique"`, `"sharded"`.
    pub kind: String,
    /// Package version that created the index.
    pub version: String,
    /// Number of bucket slots minus one, power of two minus one.
    pub hash_lim: u64,
    /// Maximum key size, in bytes.
    pub key_size: u64,
    /// Maximum document-id size, in bytes.
    pub id_size: u64,
    /// Number of shards, only for sharded indexes.
    pub shards: u64,
    /// Custom per-index settings.
    pub custom: Vec<Param>,
}

impl Params {
    const ID: u32 = PARAMS_VER;

    pub fn new(name: &str, kind: &str) -> Params {
        Params {
            name: name.to_string(),
            kind: kind.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Params::default()
        }
    }

    /// Return custom setting for `key`.
    pub fn get_custom(&self, key: &str) -> Option<&str> {
        self.custom
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Add or replace custom setting for `key`.
    pub fn set_custom(&mut self, key: &str, value: &str) -> &mut Self {
        match self.custom.iter_mut().find(|p| p.key == key) {
            Some(p) => p.value = value.to_string(),
            None => self.custom.push(Param {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
        self
    }

    /// Serialize into header bytes, of exactly `start_ind` length.
    pub fn to_header(&self, start_ind: u64) -> Result<Vec<u8>> {
        let mut data = util::into_cbor_bytes(self.clone())?;
        let n = err_at!(FailConvert, usize::try_from(start_ind))?;
        if data.len() > n {
            err_at!(
                IndexFail, msg: "header for {:?} too large {} > {}", self.name, data.len(), n
            )
        } else {
            data.resize(n, 0);
            Ok(data)
        }
    }

    /// Deserialize from header bytes.
    pub fn from_header(data: &[u8]) -> Result<Params> {
        let (params, _) = util::from_cbor_bytes(data)?;
        Ok(params)
    }
}

/// Single custom setting.
#[derive(Clone, Default, Debug, PartialEq, Eq, Cborize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    const ID: u32 = PARAM_VER;
}

#[cfg(test)]
#[path = "params_test.rs"]
mod params_test;
