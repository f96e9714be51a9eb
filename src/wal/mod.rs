//! Write-ahead log: a block-framed, checksummed record stream.
//!
//! The same framing carries both memtable logs (one record per committed
//! write group) and the manifest (one record per version edit).

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::LogReader;
pub use record::RecordType;
pub use writer::LogWriter;

/// Physical block size. Records never straddle a block without being split
/// into fragments, so a reader can resynchronise at any block boundary.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// `[crc32:4][length:2][type:1]`
pub const HEADER_SIZE: usize = 4 + 2 + 1;

/// Controls when the WAL is fsync'd to disk.
///
/// Trade-off: durability vs throughput.
///   - Manual: only when a write asks for it (`WriteOptions::sync`)
///   - EveryWrite: zero data loss, ~10x slower (each fsync waits for disk)
///   - EveryNWrites: batched durability, lose up to N records on crash
///   - EveryNMillis: bounded loss window, much higher throughput
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// fsync only on request. Records still reach the OS after every append.
    #[default]
    Manual,
    /// fsync after every record. Safest, slowest.
    EveryWrite,
    /// fsync every N records. Batched durability.
    EveryNWrites(usize),
    /// fsync when the last sync is older than N milliseconds.
    EveryNMillis(u64),
}
