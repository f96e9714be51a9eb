pub mod merge;

pub use merge::MergingIterator;

use crate::error::Result;

/// The central iteration abstraction for the storage engine.
///
/// Every sorted data source (skip list, block, table, merged view, database
/// view) implements this trait. This enables composability: the merging
/// iterator takes `Vec<Box<dyn StorageIterator>>` and merges them.
pub trait StorageIterator {
    /// Returns the current key. Only valid when is_valid() is true.
    fn key(&self) -> &[u8];

    /// Returns the current value. Only valid when is_valid() is true.
    fn value(&self) -> &[u8];

    /// Returns true if the iterator is positioned at a valid entry.
    fn is_valid(&self) -> bool;

    /// Advances to the next entry. Returns error on IO failure.
    fn next(&mut self) -> Result<()>;

    /// Positions the iterator at the first entry with key >= target.
    fn seek(&mut self, key: &[u8]) -> Result<()>;

    /// Positions the iterator at the first entry.
    fn seek_to_first(&mut self) -> Result<()>;
}

/// Iterator sources that can cross threads (compaction inputs, DB views).
pub type BoxedIterator = Box<dyn StorageIterator + Send>;

/// An iterator over nothing. Stands in for empty levels and tables.
pub struct EmptyIterator;

impl StorageIterator for EmptyIterator {
    fn key(&self) -> &[u8] {
        &[]
    }

    fn value(&self) -> &[u8] {
        &[]
    }

    fn is_valid(&self) -> bool {
        false
    }

    fn next(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek(&mut self, _key: &[u8]) -> Result<()> {
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        Ok(())
    }
}
