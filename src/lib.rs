//! Package implement the storage core of an embedded document database.
//!
//! Documents are stored as values in an append-only [storage] file, and
//! located through one or more indexes. Every index implements the
//! [Index] contract:
//!
//! * [hash::HashIndex], on-disk hash index, many entries per key, for
//!   secondary indexes.
//! * [hash::UniqueHashIndex], on-disk hash index, one entry per key, used
//!   as the `id` index.
//! * [tree::TreeIndex], ordered index, many entries per key, supports
//!   range scans.
//! * [shard::ShardedIndex], fans out over upto 255 shard indexes using a
//!   pluggable shard function.
//!
//! Hot lookups are memoized in bounded [cache]s, least-frequently-used or
//! random-replacement, optionally lock guarded for sharing across threads.
//!
//! [db::Database] binds an `id` index and secondary indexes into a
//! document store, and [db::SafeDatabase] wraps any database with a
//! single re-entrant lock, so it can be shared across threads. Scans
//! returned by a safe database re-acquire the lock on every step.
//!
//! Logging is done via the [log] facade, applications can plug in
//! a logger of their choice.

#[macro_use]
mod error;

pub mod cache;
pub mod db;
pub mod hash;
pub mod index;
pub mod shard;
pub mod storage;
pub mod tree;
pub mod util;

pub use error::{Error, Result};
pub use index::{Cursor, Entry, Index, Params, Status, Walk};
pub use storage::{FileStorage, Storage};
