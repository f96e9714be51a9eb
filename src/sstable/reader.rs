use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

use crate::bloom::{FilterBlockReader, FilterPolicy};
use crate::cache::BlockCache;
use crate::comparator::{BytewiseComparator, Comparator, InternalKeyComparator};
use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::options::{Options, ReadOptions};
use crate::sstable::block::{Block, BlockIterator};
use crate::sstable::format::{BlockHandle, Footer, read_at, read_block};
use crate::sstable::iterator::TableIterator;
use crate::types::extract_user_key;

/// An opened table file. Supports point lookups and ordered scans.
///
/// On open:
/// 1. Read footer (last 48 bytes) → metaindex and index handles
/// 2. Read and parse the index block (kept in memory)
/// 3. Find and load the filter block, if the policy names match
/// 4. Ready for queries (data blocks read on demand, through the block cache)
pub struct Table {
    file: Mutex<File>,
    file_number: u64,
    file_size: u64,
    cmp: Arc<dyn Comparator>,
    index_block: Arc<Block>,
    filter: Option<FilterBlockReader>,
    block_cache: Option<Arc<BlockCache>>,
    paranoid_checks: bool,
}

impl Table {
    pub fn open(
        options: &Options,
        path: &Path,
        file_number: u64,
        file_size: u64,
        block_cache: Option<Arc<BlockCache>>,
    ) -> Result<Self> {
        if file_size < Footer::ENCODED_LENGTH as u64 {
            return Err(Error::Corruption(format!(
                "file {} is too short to be a table",
                path.display()
            )));
        }
        let file = Mutex::new(File::open(path)?);
        let footer_offset = file_size - Footer::ENCODED_LENGTH as u64;
        let footer = Footer::decode(&read_at(&file, footer_offset, Footer::ENCODED_LENGTH)?)?;

        let index_contents = read_block(&file, file_size, &footer.index_handle, options.paranoid_checks)?;
        let index_block = Arc::new(Block::new(index_contents)?);

        let mut table = Table {
            file,
            file_number,
            file_size,
            cmp: Arc::new(InternalKeyComparator::new(Arc::clone(&options.comparator))),
            index_block,
            filter: None,
            block_cache,
            paranoid_checks: options.paranoid_checks,
        };

        if let Some(policy) = &options.filter_policy {
            // A missing or unreadable filter only costs lookups their
            // shortcut, so the table stays usable.
            match table.read_filter(policy, &footer.metaindex_handle) {
                Ok(filter) => table.filter = filter,
                Err(e) => warn!("table {}: ignoring filter block: {}", file_number, e),
            }
        }
        Ok(table)
    }

    fn read_filter(
        &self,
        policy: &Arc<dyn FilterPolicy>,
        metaindex_handle: &BlockHandle,
    ) -> Result<Option<FilterBlockReader>> {
        let contents = read_block(&self.file, self.file_size, metaindex_handle, self.paranoid_checks)?;
        let metaindex = Arc::new(Block::new(contents)?);
        let mut iter = metaindex.iter(Arc::new(BytewiseComparator));
        let key = format!("filter.{}", policy.name());
        iter.seek(key.as_bytes())?;
        if !iter.is_valid() || iter.key() != key.as_bytes() {
            return Ok(None);
        }
        let handle = BlockHandle::decode(iter.value())?;
        let data = read_block(&self.file, self.file_size, &handle, self.paranoid_checks)?;
        Ok(Some(FilterBlockReader::new(Arc::clone(policy), data)))
    }

    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    pub(crate) fn comparator(&self) -> Arc<dyn Comparator> {
        Arc::clone(&self.cmp)
    }

    pub(crate) fn index_iter(&self) -> BlockIterator {
        self.index_block.iter(self.comparator())
    }

    /// Load a data block, going through the block cache when there is one.
    pub(crate) fn block_reader(&self, options: &ReadOptions, handle: &BlockHandle) -> Result<Arc<Block>> {
        let verify = options.verify_checksums || self.paranoid_checks;
        let Some(cache) = &self.block_cache else {
            return Ok(Arc::new(Block::new(read_block(&self.file, self.file_size, handle, verify)?)?));
        };

        let cache_key = (self.file_number, handle.offset);
        if let Some(block) = cache.get(&cache_key) {
            return Ok(block);
        }
        let block = Block::new(read_block(&self.file, self.file_size, handle, verify)?)?;
        if options.fill_cache {
            let charge = block.size();
            Ok(cache.insert(cache_key, block, charge))
        } else {
            Ok(Arc::new(block))
        }
    }

    /// Find the first entry at or after the internal key `key`, skipping the
    /// block read when the filter rules the user key out. Returns the
    /// entry's (internal key, value); the caller checks the user key.
    pub fn internal_get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut index_iter = self.index_iter();
        index_iter.seek(key)?;
        if !index_iter.is_valid() {
            return Ok(None);
        }
        let handle = BlockHandle::decode(index_iter.value())?;

        if let Some(filter) = &self.filter {
            if !filter.key_may_match(handle.offset, extract_user_key(key)) {
                return Ok(None);
            }
        }

        let block = self.block_reader(options, &handle)?;
        let mut block_iter = block.iter(self.comparator());
        block_iter.seek(key)?;
        if block_iter.is_valid() {
            Ok(Some((block_iter.key().to_vec(), block_iter.value().to_vec())))
        } else {
            Ok(None)
        }
    }

    /// Two-level iterator over every entry, positioned before the first.
    pub fn iter(self: &Arc<Self>, options: &ReadOptions) -> TableIterator {
        TableIterator::new(Arc::clone(self), *options)
    }
}
