use std::fs;
use std::path::Path;

use crate::cache::table_cache::TableCache;
use crate::error::Result;
use crate::filename::table_file_name;
use crate::iterator::StorageIterator;
use crate::options::{Options, ReadOptions};
use crate::sstable::TableBuilder;
use crate::types::InternalKey;
use crate::version::FileMetaData;

/// Write every entry of `iter` into table `number`. Returns `None`, and
/// leaves no file behind, when the iterator is empty.
pub(crate) fn build_table(
    dbname: &Path,
    options: &Options,
    table_cache: &TableCache,
    iter: &mut dyn StorageIterator,
    number: u64,
) -> Result<Option<FileMetaData>> {
    iter.seek_to_first()?;
    if !iter.is_valid() {
        return Ok(None);
    }

    let path = table_file_name(dbname, number);
    let result = write_entries(&path, options, iter).and_then(|(size, smallest, largest)| {
        // Open it once through the cache so a bad table fails here rather
        // than on the first read.
        table_cache.iter(&ReadOptions::default(), number, size)?;
        Ok(FileMetaData::new(number, size, smallest, largest))
    });

    match result {
        Ok(meta) => Ok(Some(meta)),
        Err(e) => {
            let _ = fs::remove_file(&path);
            Err(e)
        }
    }
}

fn write_entries(
    path: &Path,
    options: &Options,
    iter: &mut dyn StorageIterator,
) -> Result<(u64, InternalKey, InternalKey)> {
    let mut builder = TableBuilder::new(path, options)?;
    let smallest = InternalKey::decode_from(iter.key());
    let mut largest = smallest.clone();
    while iter.is_valid() {
        largest = InternalKey::decode_from(iter.key());
        if let Err(e) = builder.add(iter.key(), iter.value()) {
            builder.abandon();
            return Err(e);
        }
        iter.next()?;
    }
    let size = builder.finish()?;
    Ok((size, smallest, largest))
}
