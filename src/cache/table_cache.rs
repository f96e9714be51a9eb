use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{BlockCache, LruCache};
use crate::error::Result;
use crate::filename::table_file_name;
use crate::options::{Options, ReadOptions};
use crate::sstable::{Table, TableIterator};

/// Keeps recently used tables open. Each entry costs one unit, so the
/// capacity is the number of open files.
pub struct TableCache {
    dbname: PathBuf,
    options: Options,
    cache: LruCache<u64, Table>,
    block_cache: Option<Arc<BlockCache>>,
}

impl TableCache {
    pub fn new(dbname: PathBuf, options: Options, block_cache: Option<Arc<BlockCache>>) -> Self {
        let capacity = options.max_open_files;
        TableCache {
            dbname,
            options,
            cache: LruCache::new(capacity),
            block_cache,
        }
    }

    /// Open (or reuse) the table for `file_number`.
    pub fn get(&self, file_number: u64, file_size: u64) -> Result<Arc<Table>> {
        if let Some(table) = self.cache.get(&file_number) {
            return Ok(table);
        }
        let path = table_file_name(&self.dbname, file_number);
        let table = Table::open(
            &self.options,
            &path,
            file_number,
            file_size,
            self.block_cache.clone(),
        )?;
        Ok(self.cache.insert(file_number, table, 1))
    }

    pub fn iter(&self, options: &ReadOptions, file_number: u64, file_size: u64) -> Result<TableIterator> {
        let table = self.get(file_number, file_size)?;
        Ok(table.iter(options))
    }

    /// Point lookup inside one table. See [`Table::internal_get`].
    pub fn internal_get(
        &self,
        options: &ReadOptions,
        file_number: u64,
        file_size: u64,
        key: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.get(file_number, file_size)?.internal_get(options, key)
    }

    /// Forget a table whose file is being deleted.
    pub fn evict(&self, file_number: u64) {
        self.cache.erase(&file_number);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
