use std::fs;
use std::path::Path;

use log::warn;

use crate::error::{Error, Result};
use crate::wal::record::{FragmentHeader, RecordType};
use crate::wal::{BLOCK_SIZE, HEADER_SIZE};

/// Reads logical records back from a log file for crash recovery.
///
/// Loads the entire file into memory, then reassembles records fragment by
/// fragment. On startup:
/// 1. Find the log files newer than the manifest's log number
/// 2. Replay each record into a fresh memtable
/// 3. A torn tail (crash mid-append) ends the stream quietly
/// 4. A damaged fragment elsewhere is skipped and reported, or fails the
///    read in strict mode
pub struct LogReader {
    data: Vec<u8>,
    strict: bool,
}

impl LogReader {
    /// Open a log file for reading.
    pub fn open(path: &Path, strict: bool) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(LogReader { data, strict })
    }

    pub fn from_bytes(data: Vec<u8>, strict: bool) -> Self {
        LogReader { data, strict }
    }

    /// Iterate over all logical records from the start of the file.
    /// Can be called again to restart.
    pub fn records(&self) -> LogRecords<'_> {
        LogRecords {
            data: &self.data,
            pos: 0,
            strict: self.strict,
            finished: false,
            dropped_bytes: 0,
            corruptions: 0,
        }
    }
}

enum Physical<'a> {
    Fragment(RecordType, &'a [u8]),
    Eof,
    Bad(usize, &'static str),
}

/// Lazy sequence of logical records.
pub struct LogRecords<'a> {
    data: &'a [u8],
    pos: usize,
    strict: bool,
    finished: bool,
    dropped_bytes: usize,
    corruptions: usize,
}

impl<'a> LogRecords<'a> {
    /// Bytes skipped because of corruption so far.
    pub fn dropped_bytes(&self) -> usize {
        self.dropped_bytes
    }

    /// Number of corruption events reported so far.
    pub fn corruptions(&self) -> usize {
        self.corruptions
    }

    fn read_physical(&mut self) -> Physical<'a> {
        loop {
            let block_start = self.pos - self.pos % BLOCK_SIZE;
            let leftover = BLOCK_SIZE - (self.pos - block_start);
            if leftover < HEADER_SIZE {
                // Zero-filled block trailer.
                self.pos += leftover;
                continue;
            }
            if self.pos >= self.data.len() {
                return Physical::Eof;
            }

            let block_end = (block_start + BLOCK_SIZE).min(self.data.len());
            let at_tail = block_end == self.data.len();
            let Some(header) = FragmentHeader::decode(&self.data[self.pos..block_end]) else {
                // Truncated header at the end of the file.
                return Physical::Eof;
            };

            let payload_start = self.pos + HEADER_SIZE;
            let payload_end = payload_start + header.length as usize;
            if payload_end > block_end {
                let dropped = block_end - self.pos;
                self.pos = block_end;
                if at_tail && block_end - block_start < BLOCK_SIZE {
                    // The writer died in the middle of this fragment.
                    return Physical::Eof;
                }
                return Physical::Bad(dropped, "bad record length");
            }

            if header.record_type == RecordType::Zero as u8 && header.length == 0 {
                // Preallocated space: nothing was ever written here.
                self.pos = block_end;
                continue;
            }

            let payload = &self.data[payload_start..payload_end];
            if !header.matches(payload) {
                // The length itself may be damaged, so drop the rest of the block.
                let dropped = block_end - self.pos;
                self.pos = block_end;
                return Physical::Bad(dropped, "checksum mismatch");
            }

            self.pos = payload_end;
            return match RecordType::from_u8(header.record_type) {
                Ok(RecordType::Zero) | Err(_) => {
                    Physical::Bad(HEADER_SIZE + payload.len(), "unknown record type")
                }
                Ok(record_type) => Physical::Fragment(record_type, payload),
            };
        }
    }

    /// Record a corruption. Returns the error to surface in strict mode.
    fn report(&mut self, bytes: usize, reason: &str) -> Option<Error> {
        self.corruptions += 1;
        self.dropped_bytes += bytes;
        if self.strict {
            self.finished = true;
            return Some(Error::Corruption(format!(
                "log corruption at offset {}: {} ({} bytes)",
                self.pos, reason, bytes
            )));
        }
        warn!(
            "log corruption at offset {}: {}, dropping {} bytes",
            self.pos, reason, bytes
        );
        None
    }
}

impl<'a> Iterator for LogRecords<'a> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut scratch: Vec<u8> = Vec::new();
        let mut in_fragmented_record = false;

        loop {
            match self.read_physical() {
                Physical::Fragment(RecordType::Full, payload) => {
                    if in_fragmented_record && !scratch.is_empty() {
                        if let Some(e) = self.report(scratch.len(), "partial record without end") {
                            return Some(Err(e));
                        }
                    }
                    return Some(Ok(payload.to_vec()));
                }
                Physical::Fragment(RecordType::First, payload) => {
                    if in_fragmented_record && !scratch.is_empty() {
                        if let Some(e) = self.report(scratch.len(), "partial record without end") {
                            return Some(Err(e));
                        }
                    }
                    scratch.clear();
                    scratch.extend_from_slice(payload);
                    in_fragmented_record = true;
                }
                Physical::Fragment(RecordType::Middle, payload) => {
                    if !in_fragmented_record {
                        if let Some(e) =
                            self.report(payload.len(), "missing start of fragmented record")
                        {
                            return Some(Err(e));
                        }
                    } else {
                        scratch.extend_from_slice(payload);
                    }
                }
                Physical::Fragment(RecordType::Last, payload) => {
                    if !in_fragmented_record {
                        if let Some(e) =
                            self.report(payload.len(), "missing start of fragmented record")
                        {
                            return Some(Err(e));
                        }
                    } else {
                        scratch.extend_from_slice(payload);
                        return Some(Ok(scratch));
                    }
                }
                Physical::Fragment(RecordType::Zero, _) => unreachable!(),
                Physical::Eof => {
                    // A fragmented record cut off by EOF is a torn write, not corruption.
                    self.finished = true;
                    return None;
                }
                Physical::Bad(bytes, reason) => {
                    let lost = bytes + if in_fragmented_record { scratch.len() } else { 0 };
                    scratch.clear();
                    in_fragmented_record = false;
                    if let Some(e) = self.report(lost, reason) {
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}
