//! # ravel
//!
//! An embedded key-value store built as a leveled log-structured merge tree.
//!
//! ## Core idea
//! Writes go to a write-ahead log and an in-memory skip list. A full
//! memtable is flushed to an immutable sorted table in level 0, and a
//! background thread merges tables down through levels 1..6, each about ten
//! times larger than the one above. Reads check the memtables, then level 0
//! newest first, then at most one table per deeper level.
//!
//! ## Layout
//! - [`wal`]: block-framed checksummed log, also used for the manifest
//! - [`memtable`]: skip list keyed by internal key
//! - [`sstable`]: table format, builder and reader
//! - [`version`]: which tables make up the database, and the manifest
//! - [`compaction`]: picking and bounding compactions
//! - [`db`]: the facade tying it all together

pub mod batch;
pub mod bloom;
pub mod cache;
pub mod coding;
pub mod comparator;
pub mod compaction;
pub mod db;
pub mod error;
pub mod filename;
pub mod iterator;
pub mod memtable;
pub mod options;
pub mod snapshot;
pub mod sstable;
pub mod types;
pub mod version;
pub mod wal;

// Public re-exports for the top-level API
pub use batch::WriteBatch;
pub use bloom::{BloomFilterPolicy, FilterPolicy};
pub use comparator::{BytewiseComparator, Comparator};
pub use db::{DB, DbIterator, LevelStats, Snapshot, Stats};
pub use error::{Error, Result};
pub use iterator::StorageIterator;
pub use options::{Options, ReadOptions, WriteOptions};
pub use wal::SyncPolicy;
