use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::error::Result;
use crate::iterator::{BoxedIterator, StorageIterator};

/// Merges multiple sorted iterators into a single sorted stream.
///
/// Used for:
/// - Range scans across memtables + all table levels
/// - Compaction (merging tables)
///
/// No deduplication happens here: every entry of every child is yielded, in
/// comparator order. With internal keys that means (user_key ASC, sequence
/// DESC); the layers above decide which versions survive.
///
/// Children are scanned linearly to find the smallest; the fan-in is a
/// handful of memtables and level-0 files plus one file per deeper level.
pub struct MergingIterator {
    cmp: Arc<dyn Comparator>,
    children: Vec<BoxedIterator>,
    current: Option<usize>,
}

impl MergingIterator {
    /// Sources are ordered by priority: index 0 = newest (memtable). On equal
    /// keys the lower index wins, which only matters for non-internal keys.
    pub fn new(cmp: Arc<dyn Comparator>, children: Vec<BoxedIterator>) -> Self {
        let mut iter = MergingIterator {
            cmp,
            children,
            current: None,
        };
        iter.find_smallest();
        iter
    }

    fn find_smallest(&mut self) {
        let mut smallest: Option<usize> = None;
        for (i, child) in self.children.iter().enumerate() {
            if !child.is_valid() {
                continue;
            }
            smallest = match smallest {
                Some(s)
                    if self.cmp.compare(child.key(), self.children[s].key())
                        != Ordering::Less =>
                {
                    Some(s)
                }
                _ => Some(i),
            };
        }
        self.current = smallest;
    }
}

impl StorageIterator for MergingIterator {
    fn key(&self) -> &[u8] {
        match self.current {
            Some(i) => self.children[i].key(),
            None => &[],
        }
    }

    fn value(&self) -> &[u8] {
        match self.current {
            Some(i) => self.children[i].value(),
            None => &[],
        }
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        if let Some(i) = self.current {
            self.children[i].next()?;
            self.find_smallest();
        }
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        for child in &mut self.children {
            child.seek(key)?;
        }
        self.find_smallest();
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.seek_to_first()?;
        }
        self.find_smallest();
        Ok(())
    }
}
