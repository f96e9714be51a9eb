use std::cmp::Ordering;
use std::sync::Arc;

use crate::coding::{Decoder, decode_fixed32};
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::iterator::StorageIterator;

/// A decoded, immutable block. Shared through `Arc` between the block cache
/// and any iterators positioned in it.
pub struct Block {
    data: Vec<u8>,
    restart_offset: usize,
    num_restarts: usize,
}

impl Block {
    /// Validate the restart trailer of raw block contents. Every restart
    /// point must fall inside the entry area.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Corruption("block too short".into()));
        }
        let num_restarts = decode_fixed32(&data[data.len() - 4..]) as usize;
        let max_restarts = (data.len() - 4) / 4;
        if num_restarts > max_restarts {
            return Err(Error::Corruption(format!(
                "block claims {} restarts, room for {}",
                num_restarts, max_restarts
            )));
        }
        let restart_offset = data.len() - (1 + num_restarts) * 4;
        let block = Block {
            data,
            restart_offset,
            num_restarts,
        };
        for index in 0..num_restarts {
            let point = block.restart_point(index);
            if point > restart_offset {
                return Err(Error::Corruption(format!(
                    "restart point {} at offset {} is past the entries ending at {}",
                    index, point, restart_offset
                )));
            }
        }
        Ok(block)
    }

    /// Bytes held by this block, used as its cache charge.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn iter(self: &Arc<Self>, cmp: Arc<dyn Comparator>) -> BlockIterator {
        BlockIterator {
            block: Arc::clone(self),
            cmp,
            valid: false,
            current: 0,
            next: 0,
            restart_index: 0,
            key: Vec::new(),
            value: (0, 0),
        }
    }

    fn restart_point(&self, index: usize) -> usize {
        decode_fixed32(&self.data[self.restart_offset + index * 4..]) as usize
    }
}

/// Cursor over a block. Owns an `Arc` to the block so it can outlive the
/// cache lookup that produced it; the current key is rebuilt from the
/// shared prefix as the cursor moves.
pub struct BlockIterator {
    block: Arc<Block>,
    cmp: Arc<dyn Comparator>,
    valid: bool,
    /// Offset of the current entry.
    current: usize,
    /// Offset just past the current entry.
    next: usize,
    /// Restart block containing `current`.
    restart_index: usize,
    key: Vec<u8>,
    value: (usize, usize),
}

impl BlockIterator {
    /// Parse the entry at `offset` on top of the current key. Returns false
    /// (and invalidates) once the entries are exhausted.
    fn parse_entry(&mut self, offset: usize) -> Result<bool> {
        let block = Arc::clone(&self.block);
        let limit = block.restart_offset;
        if offset >= limit {
            self.valid = false;
            self.current = limit;
            return Ok(false);
        }

        let mut d = Decoder::new(&block.data[offset..limit]);
        let shared = d.get_varint32()? as usize;
        let non_shared = d.get_varint32()? as usize;
        let value_len = d.get_varint32()? as usize;
        if shared > self.key.len() {
            self.valid = false;
            return Err(Error::Corruption("bad entry in block".into()));
        }
        let key_start = limit - d.remaining().len();
        let delta = d.get_bytes(non_shared)?;
        d.get_bytes(value_len)?;

        self.key.truncate(shared);
        self.key.extend_from_slice(delta);
        let value_start = key_start + non_shared;
        self.value = (value_start, value_start + value_len);
        self.current = offset;
        self.next = value_start + value_len;
        self.valid = true;

        while self.restart_index + 1 < block.num_restarts
            && block.restart_point(self.restart_index + 1) <= self.current
        {
            self.restart_index += 1;
        }
        Ok(true)
    }

    fn seek_to_restart(&mut self, index: usize) -> Result<()> {
        self.key.clear();
        self.restart_index = index;
        let offset = self.block.restart_point(index);
        self.parse_entry(offset)?;
        Ok(())
    }

    /// Full key stored at a restart point (never prefix-compressed).
    fn restart_key(&self, index: usize) -> Result<&[u8]> {
        let offset = self.block.restart_point(index);
        let mut d = Decoder::new(&self.block.data[offset..self.block.restart_offset]);
        let shared = d.get_varint32()?;
        let non_shared = d.get_varint32()? as usize;
        d.get_varint32()?;
        if shared != 0 {
            return Err(Error::Corruption("restart entry shares a prefix".into()));
        }
        d.get_bytes(non_shared)
    }
}

impl StorageIterator for BlockIterator {
    fn key(&self) -> &[u8] {
        &self.key
    }

    fn value(&self) -> &[u8] {
        &self.block.data[self.value.0..self.value.1]
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn next(&mut self) -> Result<()> {
        if self.valid {
            self.parse_entry(self.next)?;
        }
        Ok(())
    }

    /// Binary search the restart array for the last restart key < target,
    /// then scan forward to the first key >= target.
    fn seek(&mut self, target: &[u8]) -> Result<()> {
        if self.block.num_restarts == 0 {
            self.valid = false;
            return Ok(());
        }
        let mut left = 0;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right).div_ceil(2);
            if self.cmp.compare(self.restart_key(mid)?, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        self.seek_to_restart(left)?;
        while self.valid && self.cmp.compare(&self.key, target) == Ordering::Less {
            self.next()?;
        }
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        if self.block.num_restarts == 0 {
            self.valid = false;
            return Ok(());
        }
        self.seek_to_restart(0)
    }
}
