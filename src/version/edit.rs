use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::coding::{Decoder, put_length_prefixed, put_varint32, put_varint64};
use crate::error::{Error, Result};
use crate::types::{InternalKey, SequenceNumber};
use crate::version::NUM_LEVELS;

// Manifest record field tags. 8 was used by an obsolete field and is never
// written.
const TAG_COMPARATOR: u32 = 1;
const TAG_LOG_NUMBER: u32 = 2;
const TAG_NEXT_FILE_NUMBER: u32 = 3;
const TAG_LAST_SEQUENCE: u32 = 4;
const TAG_COMPACT_POINTER: u32 = 5;
const TAG_DELETED_FILE: u32 = 6;
const TAG_NEW_FILE: u32 = 7;
const TAG_PREV_LOG_NUMBER: u32 = 9;

/// One table file as known to a version.
#[derive(Debug)]
pub struct FileMetaData {
    pub number: u64,
    pub file_size: u64,
    /// Smallest internal key served by the table.
    pub smallest: InternalKey,
    /// Largest internal key served by the table.
    pub largest: InternalKey,
    /// Reads that may miss in this file before it is compacted.
    pub allowed_seeks: AtomicI64,
}

impl FileMetaData {
    pub fn new(number: u64, file_size: u64, smallest: InternalKey, largest: InternalKey) -> Self {
        // One seek costs about as much as compacting 16 KiB of data, so let
        // a file take one seek per 16 KiB before compaction pays off.
        let allowed_seeks = ((file_size / 16384) as i64).max(100);
        FileMetaData {
            number,
            file_size,
            smallest,
            largest,
            allowed_seeks: AtomicI64::new(allowed_seeks),
        }
    }
}

impl Clone for FileMetaData {
    fn clone(&self) -> Self {
        FileMetaData {
            number: self.number,
            file_size: self.file_size,
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
            allowed_seeks: AtomicI64::new(self.allowed_seeks.load(Ordering::Relaxed)),
        }
    }
}

/// A delta between two versions, and the unit of the manifest.
#[derive(Debug, Clone, Default)]
pub struct VersionEdit {
    pub comparator: Option<String>,
    pub log_number: Option<u64>,
    pub prev_log_number: Option<u64>,
    pub next_file_number: Option<u64>,
    pub last_sequence: Option<SequenceNumber>,
    pub compact_pointers: Vec<(usize, InternalKey)>,
    pub deleted_files: BTreeSet<(usize, u64)>,
    pub new_files: Vec<(usize, FileMetaData)>,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn set_comparator_name(&mut self, name: &str) {
        self.comparator = Some(name.to_string());
    }

    pub fn set_log_number(&mut self, number: u64) {
        self.log_number = Some(number);
    }

    pub fn set_prev_log_number(&mut self, number: u64) {
        self.prev_log_number = Some(number);
    }

    pub fn set_next_file(&mut self, number: u64) {
        self.next_file_number = Some(number);
    }

    pub fn set_last_sequence(&mut self, sequence: SequenceNumber) {
        self.last_sequence = Some(sequence);
    }

    pub fn set_compact_pointer(&mut self, level: usize, key: InternalKey) {
        self.compact_pointers.push((level, key));
    }

    /// Add the table `number` to `level`.
    pub fn add_file(
        &mut self,
        level: usize,
        number: u64,
        file_size: u64,
        smallest: InternalKey,
        largest: InternalKey,
    ) {
        self.new_files
            .push((level, FileMetaData::new(number, file_size, smallest, largest)));
    }

    pub fn delete_file(&mut self, level: usize, number: u64) {
        self.deleted_files.insert((level, number));
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::new();
        if let Some(name) = &self.comparator {
            put_varint32(&mut dst, TAG_COMPARATOR);
            put_length_prefixed(&mut dst, name.as_bytes());
        }
        if let Some(n) = self.log_number {
            put_varint32(&mut dst, TAG_LOG_NUMBER);
            put_varint64(&mut dst, n);
        }
        if let Some(n) = self.prev_log_number {
            put_varint32(&mut dst, TAG_PREV_LOG_NUMBER);
            put_varint64(&mut dst, n);
        }
        if let Some(n) = self.next_file_number {
            put_varint32(&mut dst, TAG_NEXT_FILE_NUMBER);
            put_varint64(&mut dst, n);
        }
        if let Some(s) = self.last_sequence {
            put_varint32(&mut dst, TAG_LAST_SEQUENCE);
            put_varint64(&mut dst, s);
        }
        for (level, key) in &self.compact_pointers {
            put_varint32(&mut dst, TAG_COMPACT_POINTER);
            put_varint32(&mut dst, *level as u32);
            put_length_prefixed(&mut dst, key.encode());
        }
        for (level, number) in &self.deleted_files {
            put_varint32(&mut dst, TAG_DELETED_FILE);
            put_varint32(&mut dst, *level as u32);
            put_varint64(&mut dst, *number);
        }
        for (level, f) in &self.new_files {
            put_varint32(&mut dst, TAG_NEW_FILE);
            put_varint32(&mut dst, *level as u32);
            put_varint64(&mut dst, f.number);
            put_varint64(&mut dst, f.file_size);
            put_length_prefixed(&mut dst, f.smallest.encode());
            put_length_prefixed(&mut dst, f.largest.encode());
        }
        dst
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut edit = VersionEdit::new();
        let mut d = Decoder::new(src);
        while !d.is_empty() {
            let tag = d.get_varint32()?;
            match tag {
                TAG_COMPARATOR => {
                    let name = d.get_length_prefixed()?;
                    let name = std::str::from_utf8(name)
                        .map_err(|_| Error::Corruption("comparator name is not utf-8".into()))?;
                    edit.comparator = Some(name.to_string());
                }
                TAG_LOG_NUMBER => edit.log_number = Some(d.get_varint64()?),
                TAG_PREV_LOG_NUMBER => edit.prev_log_number = Some(d.get_varint64()?),
                TAG_NEXT_FILE_NUMBER => edit.next_file_number = Some(d.get_varint64()?),
                TAG_LAST_SEQUENCE => edit.last_sequence = Some(d.get_varint64()?),
                TAG_COMPACT_POINTER => {
                    let level = get_level(&mut d)?;
                    let key = get_internal_key(&mut d)?;
                    edit.compact_pointers.push((level, key));
                }
                TAG_DELETED_FILE => {
                    let level = get_level(&mut d)?;
                    let number = d.get_varint64()?;
                    edit.deleted_files.insert((level, number));
                }
                TAG_NEW_FILE => {
                    let level = get_level(&mut d)?;
                    let number = d.get_varint64()?;
                    let file_size = d.get_varint64()?;
                    let smallest = get_internal_key(&mut d)?;
                    let largest = get_internal_key(&mut d)?;
                    edit.new_files
                        .push((level, FileMetaData::new(number, file_size, smallest, largest)));
                }
                _ => {
                    return Err(Error::Corruption(format!(
                        "unknown tag {} in version edit",
                        tag
                    )));
                }
            }
        }
        Ok(edit)
    }
}

fn get_level(d: &mut Decoder<'_>) -> Result<usize> {
    let level = d.get_varint32()? as usize;
    if level >= NUM_LEVELS {
        return Err(Error::Corruption(format!("level {} out of range", level)));
    }
    Ok(level)
}

fn get_internal_key(d: &mut Decoder<'_>) -> Result<InternalKey> {
    let encoded = d.get_length_prefixed()?;
    let key = InternalKey::decode_from(encoded);
    key.parse()?;
    Ok(key)
}
