use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::wal::record::{FragmentHeader, RecordType};
use crate::wal::{BLOCK_SIZE, HEADER_SIZE, SyncPolicy};

/// Appends logical records to a log file, fragmenting them across blocks.
///
/// Every record must be durable before it's acknowledged to the client
/// (according to the sync policy). On restart, the reader replays the log to
/// reconstruct the memtable (or the version set, for the manifest).
///
/// Two layers of buffering:
///   BufWriter.flush()  → Rust buffer → OS page cache
///   file.sync_data()   → OS page cache → physical disk
pub struct LogWriter {
    writer: BufWriter<File>,
    /// Bytes already used in the current block.
    block_offset: usize,
    /// Total bytes written (file length).
    offset: u64,
    sync_policy: SyncPolicy,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl LogWriter {
    /// Create (truncating) a log file at `path`.
    pub fn create(path: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_file(file, 0, sync_policy))
    }

    /// Open an existing log file and keep appending after its current end.
    pub fn append_to(path: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::from_file(file, len, sync_policy))
    }

    fn from_file(file: File, len: u64, sync_policy: SyncPolicy) -> Self {
        LogWriter {
            writer: BufWriter::new(file),
            block_offset: (len % BLOCK_SIZE as u64) as usize,
            offset: len,
            sync_policy,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        }
    }

    /// Append one logical record. The record reaches the OS before this
    /// returns; it reaches the disk when the sync policy says so.
    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        let mut left = record;
        let mut begin = true;

        // Always emit at least one fragment, even for an empty record.
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                // Not even a header fits: pad the block trailer with zeros.
                if leftover > 0 {
                    self.writer.write_all(&[0u8; HEADER_SIZE][..leftover])?;
                    self.offset += leftover as u64;
                }
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_len = left.len().min(avail);
            let end = fragment_len == left.len();
            let record_type = match (begin, end) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };

            self.emit_fragment(record_type, &left[..fragment_len])?;
            left = &left[fragment_len..];
            begin = false;
            if end {
                break;
            }
        }

        self.writer.flush()?;
        self.writes_since_sync += 1;

        let due = match self.sync_policy {
            SyncPolicy::Manual => false,
            SyncPolicy::EveryWrite => true,
            SyncPolicy::EveryNWrites(n) => self.writes_since_sync >= n.max(1),
            SyncPolicy::EveryNMillis(ms) => {
                self.last_sync.elapsed() >= Duration::from_millis(ms)
            }
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    fn emit_fragment(&mut self, record_type: RecordType, payload: &[u8]) -> Result<()> {
        let header = FragmentHeader::for_payload(record_type, payload);
        self.writer.write_all(&header.encode())?;
        self.writer.write_all(payload)?;
        let written = HEADER_SIZE + payload.len();
        self.block_offset += written;
        self.offset += written as u64;
        Ok(())
    }

    /// Push buffered bytes to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Force fsync to disk. Ensures all buffered writes are durable.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Records appended since the last fsync.
    pub fn writes_since_sync(&self) -> usize {
        self.writes_since_sync
    }

    /// Current file offset (bytes written so far).
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
