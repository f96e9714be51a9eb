use std::sync::Arc;

use bytes::BufMut;

use crate::bloom::FilterPolicy;

/// One filter per 2 KiB of data-block offsets.
pub const FILTER_BASE_LG: u8 = 11;
pub const FILTER_BASE: u64 = 1 << FILTER_BASE_LG;

/// Builds the single filter block of a table.
///
/// Keys are grouped by the file offset of the data block they land in: all
/// blocks starting inside the same 2 KiB window share one filter. Layout:
///
/// ```text
/// [filter 0][filter 1]...[offset of filter i (4B)]*[array offset (4B)][base_lg (1B)]
/// ```
///
/// Call sequence: (start_block add_key*)* finish
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    /// Flattened keys of the pending filter.
    keys: Vec<u8>,
    starts: Vec<usize>,
    result: Vec<u8>,
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        FilterBlockBuilder {
            policy,
            keys: Vec::new(),
            starts: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// A new data block begins at `block_offset`. Emits filters for every
    /// window passed since the previous call.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = (block_offset / FILTER_BASE) as usize;
        assert!(filter_index >= self.filter_offsets.len());
        while filter_index > self.filter_offsets.len() {
            self.generate_filter();
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        self.starts.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    pub fn finish(mut self) -> Vec<u8> {
        if !self.starts.is_empty() {
            self.generate_filter();
        }
        let array_offset = self.result.len() as u32;
        for offset in &self.filter_offsets {
            self.result.put_u32_le(*offset);
        }
        self.result.put_u32_le(array_offset);
        self.result.put_u8(FILTER_BASE_LG);
        self.result
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.starts.is_empty() {
            // Window without keys: empty filter.
            return;
        }

        self.starts.push(self.keys.len());
        let keys: Vec<&[u8]> = self
            .starts
            .windows(2)
            .map(|w| &self.keys[w[0]..w[1]])
            .collect();
        let filter = self.policy.create_filter(&keys);
        self.result.extend_from_slice(&filter);

        self.keys.clear();
        self.starts.clear();
    }
}
