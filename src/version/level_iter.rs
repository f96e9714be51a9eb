use std::sync::Arc;

use crate::cache::TableCache;
use crate::comparator::InternalKeyComparator;
use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::options::ReadOptions;
use crate::sstable::TableIterator;
use crate::version::FileMetaData;
use crate::version::version::find_file;

/// Concatenates the tables of one sorted, disjoint level. Tables are opened
/// lazily as the cursor reaches them.
pub struct LevelIterator {
    icmp: InternalKeyComparator,
    files: Vec<Arc<FileMetaData>>,
    table_cache: Arc<TableCache>,
    options: ReadOptions,
    /// Index into `files` of the table `table_iter` walks.
    index: usize,
    table_iter: Option<TableIterator>,
}

impl LevelIterator {
    pub fn new(
        icmp: InternalKeyComparator,
        files: Vec<Arc<FileMetaData>>,
        table_cache: Arc<TableCache>,
        options: ReadOptions,
    ) -> Self {
        let index = files.len();
        LevelIterator {
            icmp,
            files,
            table_cache,
            options,
            index,
            table_iter: None,
        }
    }

    fn open_table(&mut self, index: usize) -> Result<()> {
        self.index = index;
        self.table_iter = match self.files.get(index) {
            Some(f) => Some(self.table_cache.iter(&self.options, f.number, f.file_size)?),
            None => None,
        };
        Ok(())
    }

    fn skip_empty_tables(&mut self) -> Result<()> {
        while self.table_iter.as_ref().is_some_and(|t| !t.is_valid()) {
            self.open_table(self.index + 1)?;
            if let Some(t) = self.table_iter.as_mut() {
                t.seek_to_first()?;
            }
        }
        Ok(())
    }
}

impl StorageIterator for LevelIterator {
    fn key(&self) -> &[u8] {
        self.table_iter.as_ref().map_or(&[][..], |t| t.key())
    }

    fn value(&self) -> &[u8] {
        self.table_iter.as_ref().map_or(&[][..], |t| t.value())
    }

    fn is_valid(&self) -> bool {
        self.table_iter.as_ref().is_some_and(|t| t.is_valid())
    }

    fn next(&mut self) -> Result<()> {
        if let Some(t) = self.table_iter.as_mut() {
            t.next()?;
        }
        self.skip_empty_tables()
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        let index = find_file(&self.icmp, &self.files, target);
        self.open_table(index)?;
        if let Some(t) = self.table_iter.as_mut() {
            t.seek(target)?;
        }
        self.skip_empty_tables()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.open_table(0)?;
        if let Some(t) = self.table_iter.as_mut() {
            t.seek_to_first()?;
        }
        self.skip_empty_tables()
    }
}
