use std::collections::BTreeMap;

use crate::types::SequenceNumber;

/// Sequence numbers pinned by live snapshots, with a count per sequence
/// since several snapshots may share one.
#[derive(Debug, Default)]
pub struct SnapshotList {
    pinned: BTreeMap<SequenceNumber, usize>,
}

impl SnapshotList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, sequence: SequenceNumber) {
        *self.pinned.entry(sequence).or_insert(0) += 1;
    }

    pub fn release(&mut self, sequence: SequenceNumber) {
        if let Some(count) = self.pinned.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                self.pinned.remove(&sequence);
            }
        }
    }

    /// Oldest pinned sequence. Compaction must keep every version a reader
    /// at this sequence could see.
    pub fn oldest(&self) -> Option<SequenceNumber> {
        self.pinned.keys().next().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pinned.values().sum()
    }
}
