use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::BufMut;

use crate::bloom::{FilterBlockBuilder, FilterPolicy};
use crate::comparator::{Comparator, InternalKeyComparator};
use crate::error::Result;
use crate::options::Options;
use crate::sstable::block::BlockBuilder;
use crate::sstable::format::{BlockHandle, Footer, NO_COMPRESSION, block_crc};
use crate::types::extract_user_key;

/// Builds a table file from a sorted stream of internal keys.
///
/// Used during:
/// - Memtable flush (sorted memtable → table)
/// - Compaction (merged iterators → new tables)
///
/// Build process:
/// 1. Add entries one by one (strictly increasing internal keys)
/// 2. Entries fill up data blocks; a full block is written out and an index
///    entry (its last key → its handle) is queued
/// 3. finish() writes the filter, metaindex and index blocks, the footer,
///    then fsyncs
pub struct TableBuilder {
    writer: BufWriter<File>,
    cmp: InternalKeyComparator,
    block_size: usize,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter_policy: Option<Arc<dyn FilterPolicy>>,
    filter_block: Option<FilterBlockBuilder>,
    /// Bytes written so far.
    offset: u64,
    num_entries: u64,
    last_key: Vec<u8>,
    /// Index entry for the last flushed block, added once the next key (or
    /// finish) arrives.
    pending_handle: Option<BlockHandle>,
    closed: bool,
}

impl TableBuilder {
    pub fn new(path: &Path, options: &Options) -> Result<Self> {
        let file = File::create(path)?;
        let filter_block = options
            .filter_policy
            .as_ref()
            .map(|p| FilterBlockBuilder::new(Arc::clone(p)));
        let mut builder = TableBuilder {
            writer: BufWriter::new(file),
            cmp: InternalKeyComparator::new(Arc::clone(&options.comparator)),
            block_size: options.block_size,
            data_block: BlockBuilder::new(options.block_restart_interval),
            index_block: BlockBuilder::new(1),
            filter_policy: options.filter_policy.clone(),
            filter_block,
            offset: 0,
            num_entries: 0,
            last_key: Vec::new(),
            pending_handle: None,
            closed: false,
        };
        if let Some(fb) = builder.filter_block.as_mut() {
            fb.start_block(0);
        }
        Ok(builder)
    }

    /// Add an internal key. Keys must arrive strictly increasing; anything
    /// else is a bug in the caller and panics.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        assert!(!self.closed, "add after finish or abandon");
        if self.num_entries > 0 {
            assert_eq!(
                self.cmp.compare(key, &self.last_key),
                Ordering::Greater,
                "table keys must be strictly increasing"
            );
        }

        if let Some(handle) = self.pending_handle.take() {
            self.index_block.add(&self.last_key, &handle.encode());
        }
        if let Some(fb) = self.filter_block.as_mut() {
            fb.add_key(extract_user_key(key));
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write out the current data block, if any.
    pub fn flush(&mut self) -> Result<()> {
        assert!(!self.closed);
        if self.data_block.is_empty() {
            return Ok(());
        }
        let contents = self.data_block.finish();
        let handle = self.write_raw_block(&contents)?;
        self.pending_handle = Some(handle);
        self.writer.flush()?;
        if let Some(fb) = self.filter_block.as_mut() {
            fb.start_block(self.offset);
        }
        Ok(())
    }

    fn write_raw_block(&mut self, contents: &[u8]) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, contents.len() as u64);
        self.writer.write_all(contents)?;
        let mut trailer = Vec::with_capacity(5);
        trailer.put_u8(NO_COMPRESSION);
        trailer.put_u32_le(block_crc(contents, NO_COMPRESSION));
        self.writer.write_all(&trailer)?;
        self.offset += (contents.len() + trailer.len()) as u64;
        Ok(handle)
    }

    /// Finish the table and fsync it. Returns the final file size.
    pub fn finish(&mut self) -> Result<u64> {
        self.flush()?;
        self.closed = true;

        let filter_handle = match self.filter_block.take() {
            Some(fb) => Some(self.write_raw_block(&fb.finish())?),
            None => None,
        };

        let mut metaindex = BlockBuilder::new(1);
        if let (Some(policy), Some(handle)) = (&self.filter_policy, filter_handle) {
            let key = format!("filter.{}", policy.name());
            metaindex.add(key.as_bytes(), &handle.encode());
        }
        let metaindex_handle = self.write_raw_block(&metaindex.finish())?;

        if let Some(handle) = self.pending_handle.take() {
            self.index_block.add(&self.last_key, &handle.encode());
        }
        let index_contents = self.index_block.finish();
        let index_handle = self.write_raw_block(&index_contents)?;

        let footer = Footer {
            metaindex_handle,
            index_handle,
        };
        let encoded = footer.encode();
        self.writer.write_all(&encoded)?;
        self.offset += encoded.len() as u64;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.offset)
    }

    /// Stop building. The caller deletes the partial file.
    pub fn abandon(&mut self) {
        self.closed = true;
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written so far; the final size after `finish`.
    pub fn file_size(&self) -> u64 {
        self.offset
    }
}
