use bytes::BufMut;

use crate::coding::{Decoder, put_varint32};
use crate::error::{Error, Result};
use crate::memtable::MemTable;
use crate::types::{SequenceNumber, ValueType};

/// `[sequence:8][count:4]`
pub const BATCH_HEADER_SIZE: usize = 12;

/// An atomic group of puts and deletes.
///
/// Kept in its wire form so that the write path can log it without
/// re-encoding:
/// ```text
/// [sequence:8][count:4] { [type:1][key_len:varint][key] ([value_len:4][value])? }*
/// ```
/// Value fields follow only `Value` operations.
#[derive(Clone, PartialEq, Eq)]
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch {
            rep: vec![0u8; BATCH_HEADER_SIZE],
        }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.put_u8(ValueType::Value as u8);
        put_varint32(&mut self.rep, key.len() as u32);
        self.rep.put_slice(key);
        self.rep.put_u32_le(value.len() as u32);
        self.rep.put_slice(value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.put_u8(ValueType::Deletion as u8);
        put_varint32(&mut self.rep, key.len() as u32);
        self.rep.put_slice(key);
    }

    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(BATCH_HEADER_SIZE, 0);
    }

    /// Number of operations in the batch.
    pub fn count(&self) -> u32 {
        u32::from_le_bytes([self.rep[8], self.rep[9], self.rep[10], self.rep[11]])
    }

    fn set_count(&mut self, count: u32) {
        self.rep[8..12].copy_from_slice(&count.to_le_bytes());
    }

    pub fn sequence(&self) -> SequenceNumber {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.rep[..8]);
        u64::from_le_bytes(buf)
    }

    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        self.rep[..8].copy_from_slice(&sequence.to_le_bytes());
    }

    /// Size of the encoded batch; the group-commit budget is measured in it.
    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Append the operations of `other` after ours.
    pub fn append(&mut self, other: &WriteBatch) {
        self.set_count(self.count() + other.count());
        self.rep.extend_from_slice(&other.rep[BATCH_HEADER_SIZE..]);
    }

    /// The wire form, as written to the log.
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    /// Rebuild a batch from a log record.
    pub fn from_contents(contents: &[u8]) -> Result<Self> {
        if contents.len() < BATCH_HEADER_SIZE {
            return Err(Error::Corruption("log record too small for a batch".into()));
        }
        Ok(WriteBatch {
            rep: contents.to_vec(),
        })
    }

    /// Walk every operation in order. `f` receives (type, key, value), the
    /// value being empty for deletions.
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(ValueType, &[u8], &[u8]) -> Result<()>,
    {
        let mut input = Decoder::new(&self.rep[BATCH_HEADER_SIZE..]);
        let mut found = 0u32;
        while !input.is_empty() {
            found += 1;
            let value_type = ValueType::from_u8(input.get_u8()?)?;
            let key = input.get_length_prefixed()?;
            match value_type {
                ValueType::Value => {
                    let len = input.get_fixed32()? as usize;
                    let value = input.get_bytes(len)?;
                    f(ValueType::Value, key, value)?;
                }
                ValueType::Deletion => f(ValueType::Deletion, key, &[])?,
            }
        }
        if found != self.count() {
            return Err(Error::Corruption(format!(
                "batch has wrong count: header says {}, found {}",
                self.count(),
                found
            )));
        }
        Ok(())
    }

    /// Decode the whole batch without acting on it.
    pub fn validate(&self) -> Result<()> {
        self.for_each(|_, _, _| Ok(()))
    }

    /// Insert every operation into `mem`, numbering them from the batch's
    /// sequence upwards. A damaged batch inserts nothing.
    pub fn insert_into(&self, mem: &MemTable) -> Result<()> {
        self.validate()?;
        let mut sequence = self.sequence();
        self.for_each(|value_type, key, value| {
            mem.add(sequence, value_type, key, value);
            sequence += 1;
            Ok(())
        })
    }
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch")
            .field("sequence", &self.sequence())
            .field("count", &self.count())
            .field("bytes", &self.rep.len())
            .finish()
    }
}
