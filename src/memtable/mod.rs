pub mod skiplist;

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use parking_lot::RwLock;

use crate::comparator::{Comparator, InternalKeyComparator};
use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::types::{Lookup, LookupKey, ParsedInternalKey, SequenceNumber, ValueType, append_internal_key};
use skiplist::SkipList;

/// In-memory sorted buffer for writes. Wraps a SkipList keyed by encoded
/// internal keys.
///
/// Every write goes here first. When its size exceeds the write buffer
/// budget, the memtable is frozen (becomes immutable) and flushed to a table.
///
/// Deletes are tombstone entries, not removals: older versions may exist in
/// tables on disk. Multiple versions of a key coexist, newest first.
///
/// Single writer, many readers. The list sits behind a RwLock; because the
/// arena only grows, readers holding an arena index across lock releases
/// (iterators) never see it invalidated.
pub struct MemTable {
    cmp: InternalKeyComparator,
    table: RwLock<SkipList>,
    usage: AtomicUsize,
}

impl MemTable {
    pub fn new(cmp: InternalKeyComparator) -> Self {
        let list_cmp: Arc<dyn Comparator> = Arc::new(cmp.clone());
        MemTable {
            cmp,
            table: RwLock::new(SkipList::new(list_cmp)),
            usage: AtomicUsize::new(0),
        }
    }

    /// Insert an entry for (key, sequence, type). A deletion carries an empty
    /// value.
    pub fn add(&self, sequence: SequenceNumber, value_type: ValueType, key: &[u8], value: &[u8]) {
        let mut internal_key = Vec::with_capacity(key.len() + 8);
        append_internal_key(&mut internal_key, key, sequence, value_type);
        let mut table = self.table.write();
        table.insert(internal_key, value.to_vec());
        self.usage.store(table.size_bytes(), AtomicOrdering::Release);
    }

    /// Find the newest entry for the lookup's user key that is not newer
    /// than the lookup's sequence. `None` when the memtable knows nothing
    /// about the key.
    pub fn get(&self, key: &LookupKey) -> Option<Lookup> {
        let table = self.table.read();
        let idx = table.seek_index(key.internal_key())?;
        let (entry_key, value) = table.entry(idx);
        let parsed = ParsedInternalKey::parse(entry_key).ok()?;
        if self.cmp.compare_user(parsed.user_key, key.user_key()) != Ordering::Equal {
            return None;
        }
        match parsed.value_type {
            ValueType::Value => Some(Lookup::Value(value.to_vec())),
            ValueType::Deletion => Some(Lookup::Deleted),
        }
    }

    /// Accumulated byte cost, for flush-threshold decisions.
    pub fn approximate_memory_usage(&self) -> usize {
        self.usage.load(AtomicOrdering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Ordered iterator over every entry (tombstones included), positioned
    /// at the first entry.
    pub fn iter(self: &Arc<Self>) -> MemTableIterator {
        let mut iter = MemTableIterator {
            mem: Arc::clone(self),
            current: None,
            key: Vec::new(),
            value: Vec::new(),
        };
        let first = self.table.read().first_index();
        iter.position(first);
        iter
    }
}

/// Iterator over a shared memtable. Holds the table alive and copies out the
/// current entry so no lock is held between calls.
pub struct MemTableIterator {
    mem: Arc<MemTable>,
    current: Option<usize>,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl MemTableIterator {
    fn position(&mut self, idx: Option<usize>) {
        self.current = idx;
        self.key.clear();
        self.value.clear();
        if let Some(i) = idx {
            let table = self.mem.table.read();
            let (k, v) = table.entry(i);
            self.key.extend_from_slice(k);
            self.value.extend_from_slice(v);
        }
    }
}

impl StorageIterator for MemTableIterator {
    fn key(&self) -> &[u8] {
        &self.key
    }

    fn value(&self) -> &[u8] {
        &self.value
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        if let Some(i) = self.current {
            let next = self.mem.table.read().next_index(i);
            self.position(next);
        }
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        let idx = self.mem.table.read().seek_index(key);
        self.position(idx);
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        let idx = self.mem.table.read().first_index();
        self.position(idx);
        Ok(())
    }
}
