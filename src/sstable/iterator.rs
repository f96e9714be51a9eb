use std::sync::Arc;

use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::options::ReadOptions;
use crate::sstable::block::BlockIterator;
use crate::sstable::format::BlockHandle;
use crate::sstable::reader::Table;

/// Two-level iterator: the index block picks a data block, a block iterator
/// walks it. Empty or exhausted data blocks are skipped transparently.
pub struct TableIterator {
    table: Arc<Table>,
    options: ReadOptions,
    index_iter: BlockIterator,
    data_iter: Option<BlockIterator>,
    /// Offset of the block `data_iter` walks.
    data_offset: Option<u64>,
}

impl TableIterator {
    pub(crate) fn new(table: Arc<Table>, options: ReadOptions) -> Self {
        let index_iter = table.index_iter();
        TableIterator {
            table,
            options,
            index_iter,
            data_iter: None,
            data_offset: None,
        }
    }

    /// Point `data_iter` at the block the index iterator names. Keeps the
    /// current block iterator if it already walks that block.
    fn init_data_block(&mut self) -> Result<()> {
        if !self.index_iter.is_valid() {
            self.data_iter = None;
            self.data_offset = None;
            return Ok(());
        }
        let handle = BlockHandle::decode(self.index_iter.value())?;
        if self.data_iter.is_some() && self.data_offset == Some(handle.offset) {
            return Ok(());
        }
        let block = self.table.block_reader(&self.options, &handle)?;
        self.data_iter = Some(block.iter(self.table.comparator()));
        self.data_offset = Some(handle.offset);
        Ok(())
    }

    fn skip_empty_data_blocks(&mut self) -> Result<()> {
        while !self.data_iter.as_ref().is_some_and(|d| d.is_valid()) {
            if !self.index_iter.is_valid() {
                self.data_iter = None;
                self.data_offset = None;
                return Ok(());
            }
            self.index_iter.next()?;
            self.init_data_block()?;
            if let Some(d) = self.data_iter.as_mut() {
                d.seek_to_first()?;
            }
        }
        Ok(())
    }
}

impl StorageIterator for TableIterator {
    fn key(&self) -> &[u8] {
        self.data_iter.as_ref().map_or(&[][..], |d| d.key())
    }

    fn value(&self) -> &[u8] {
        self.data_iter.as_ref().map_or(&[][..], |d| d.value())
    }

    fn is_valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|d| d.is_valid())
    }

    fn next(&mut self) -> Result<()> {
        if let Some(d) = self.data_iter.as_mut() {
            d.next()?;
        }
        self.skip_empty_data_blocks()
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        self.index_iter.seek(target)?;
        self.init_data_block()?;
        if let Some(d) = self.data_iter.as_mut() {
            d.seek(target)?;
        }
        self.skip_empty_data_blocks()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.index_iter.seek_to_first()?;
        self.init_data_block()?;
        if let Some(d) = self.data_iter.as_mut() {
            d.seek_to_first()?;
        }
        self.skip_empty_data_blocks()
    }
}
