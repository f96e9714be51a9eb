use std::sync::Arc;

use crate::bloom::FilterPolicy;
use crate::coding::decode_fixed32;

/// Answers "may this data block hold the key?" from a table's filter block.
/// Anything malformed reads as a potential match, so a damaged filter costs
/// I/O but never hides data.
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Vec<u8>,
    /// Start of the offset array.
    offset_start: usize,
    num: usize,
    base_lg: u8,
}

impl FilterBlockReader {
    pub fn new(policy: Arc<dyn FilterPolicy>, data: Vec<u8>) -> Self {
        let mut reader = FilterBlockReader {
            policy,
            data,
            offset_start: 0,
            num: 0,
            base_lg: 0,
        };
        let n = reader.data.len();
        if n < 5 {
            return reader;
        }
        reader.base_lg = reader.data[n - 1];
        let array_offset = decode_fixed32(&reader.data[n - 5..]) as usize;
        if array_offset > n - 5 {
            return reader;
        }
        reader.offset_start = array_offset;
        reader.num = (n - 5 - array_offset) / 4;
        reader
    }

    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index >= self.num {
            return true;
        }
        let entry = self.offset_start + index * 4;
        let start = decode_fixed32(&self.data[entry..]) as usize;
        let limit = decode_fixed32(&self.data[entry + 4..]) as usize;
        if start <= limit && limit <= self.offset_start {
            // An empty range is an empty filter, which matches nothing.
            return self.policy.key_may_match(key, &self.data[start..limit]);
        }
        true
    }
}
