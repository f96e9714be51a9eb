use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::error::Result;
use crate::iterator::{MergingIterator, StorageIterator};
use crate::types::{LookupKey, ParsedInternalKey, SequenceNumber, ValueType};
use crate::version::Version;

/// Forward iterator over the user-visible contents of the database at one
/// sequence number.
///
/// Wraps a merge of the memtables and every table. For each user key only
/// the newest entry at or below the sequence counts; keys whose newest
/// entry is a tombstone are skipped. Keys and values are copied out, so the
/// iterator holds no lock between calls.
pub struct DbIterator {
    inner: MergingIterator,
    ucmp: Arc<dyn Comparator>,
    sequence: SequenceNumber,
    /// Keeps the files under `inner` from being deleted.
    _version: Arc<Version>,
    valid: bool,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl DbIterator {
    pub(crate) fn new(
        inner: MergingIterator,
        ucmp: Arc<dyn Comparator>,
        sequence: SequenceNumber,
        version: Arc<Version>,
    ) -> Result<Self> {
        let mut iter = DbIterator {
            inner,
            ucmp,
            sequence,
            _version: version,
            valid: false,
            key: Vec::new(),
            value: Vec::new(),
        };
        iter.seek_to_first()?;
        Ok(iter)
    }

    /// Advance `inner` to the next visible entry. With `skipping`, entries
    /// whose user key is <= `self.key` are already accounted for.
    fn find_next_user_entry(&mut self, mut skipping: bool) -> Result<()> {
        while self.inner.is_valid() {
            if let Ok(ikey) = ParsedInternalKey::parse(self.inner.key()) {
                if ikey.sequence <= self.sequence {
                    match ikey.value_type {
                        ValueType::Deletion => {
                            // Hide every older entry for this key.
                            self.key.clear();
                            self.key.extend_from_slice(ikey.user_key);
                            skipping = true;
                        }
                        ValueType::Value => {
                            let hidden = skipping
                                && self.ucmp.compare(ikey.user_key, &self.key) != Ordering::Greater;
                            if !hidden {
                                self.key.clear();
                                self.key.extend_from_slice(ikey.user_key);
                                self.value.clear();
                                self.value.extend_from_slice(self.inner.value());
                                self.valid = true;
                                return Ok(());
                            }
                        }
                    }
                }
            }
            self.inner.next()?;
        }
        self.valid = false;
        Ok(())
    }
}

impl StorageIterator for DbIterator {
    /// The current user key.
    fn key(&self) -> &[u8] {
        &self.key
    }

    fn value(&self) -> &[u8] {
        &self.value
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn next(&mut self) -> Result<()> {
        if !self.valid {
            return Ok(());
        }
        // `self.key` holds the user key just returned; skip its older entries.
        self.inner.next()?;
        self.find_next_user_entry(true)
    }

    /// Position at the first visible user key >= `key`.
    fn seek(&mut self, key: &[u8]) -> Result<()> {
        let lkey = LookupKey::new(key, self.sequence);
        self.inner.seek(lkey.internal_key())?;
        self.find_next_user_entry(false)
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.inner.seek_to_first()?;
        self.find_next_user_entry(false)
    }
}
