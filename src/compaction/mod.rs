//! What a compaction reads and where its output goes.
//!
//! A compaction of level L merges a set of L files with every file of L+1
//! they overlap and writes the result to L+1. Level L+2 ("grandparents")
//! bounds how much each output file may overlap, so that the next
//! compaction down stays cheap.

pub mod stats;

use std::cmp::Ordering;
use std::sync::Arc;

pub use stats::CompactionStats;

use crate::comparator::{Comparator, InternalKeyComparator};
use crate::options::Options;
use crate::version::{
    FileMetaData, NUM_LEVELS, Version, VersionEdit, max_grandparent_overlap_bytes, total_file_size,
};

pub struct Compaction {
    level: usize,
    max_output_file_size: u64,
    max_grandparent_overlap_bytes: u64,
    icmp: InternalKeyComparator,
    input_version: Arc<Version>,
    edit: VersionEdit,
    /// `inputs[0]` from `level`, `inputs[1]` from `level + 1`.
    pub(crate) inputs: [Vec<Arc<FileMetaData>>; 2],
    pub(crate) grandparents: Vec<Arc<FileMetaData>>,
    grandparent_index: usize,
    seen_key: bool,
    /// Grandparent bytes overlapped by the current output.
    overlapped_bytes: u64,
    /// Per level cursor for `is_base_level_for_key`. Keys arrive in order,
    /// so the cursors only move forward.
    level_ptrs: [usize; NUM_LEVELS],
}

impl Compaction {
    pub fn new(options: &Options, level: usize, input_version: Arc<Version>, icmp: InternalKeyComparator) -> Self {
        Compaction {
            level,
            max_output_file_size: options.max_file_size,
            max_grandparent_overlap_bytes: max_grandparent_overlap_bytes(options),
            icmp,
            input_version,
            edit: VersionEdit::new(),
            inputs: [Vec::new(), Vec::new()],
            grandparents: Vec::new(),
            grandparent_index: 0,
            seen_key: false,
            overlapped_bytes: 0,
            level_ptrs: [0; NUM_LEVELS],
        }
    }

    /// Level being compacted; outputs go to `level() + 1`.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn input_version(&self) -> &Arc<Version> {
        &self.input_version
    }

    pub fn edit(&self) -> &VersionEdit {
        &self.edit
    }

    pub fn edit_mut(&mut self) -> &mut VersionEdit {
        &mut self.edit
    }

    pub fn num_input_files(&self, which: usize) -> usize {
        self.inputs[which].len()
    }

    pub fn input(&self, which: usize, i: usize) -> &Arc<FileMetaData> {
        &self.inputs[which][i]
    }

    pub fn max_output_file_size(&self) -> u64 {
        self.max_output_file_size
    }

    /// A single input file with nothing to merge against can be moved to
    /// the next level by editing metadata alone, unless that would leave it
    /// overlapping too much of the grandparent level.
    pub fn is_trivial_move(&self) -> bool {
        self.inputs[0].len() == 1
            && self.inputs[1].is_empty()
            && total_file_size(&self.grandparents) <= self.max_grandparent_overlap_bytes
    }

    /// Record every input as deleted in the edit.
    pub fn add_input_deletions(&mut self) {
        for which in 0..2 {
            for f in &self.inputs[which] {
                self.edit.delete_file(self.level + which, f.number);
            }
        }
    }

    /// True when no level below the output level can hold `user_key`, so a
    /// tombstone for it can be dropped.
    pub fn is_base_level_for_key(&mut self, user_key: &[u8]) -> bool {
        let ucmp = self.icmp.user_comparator();
        for level in self.level + 2..NUM_LEVELS {
            let files = self.input_version.files(level);
            while self.level_ptrs[level] < files.len() {
                let f = &files[self.level_ptrs[level]];
                if ucmp.compare(user_key, f.largest.user_key()) != Ordering::Greater {
                    if ucmp.compare(user_key, f.smallest.user_key()) != Ordering::Less {
                        return false;
                    }
                    break;
                }
                self.level_ptrs[level] += 1;
            }
        }
        true
    }

    /// True when the current output should be closed before `internal_key`
    /// is added, because it already overlaps enough grandparent data.
    pub fn should_stop_before(&mut self, internal_key: &[u8]) -> bool {
        while self.grandparent_index < self.grandparents.len()
            && self.icmp.compare(
                internal_key,
                self.grandparents[self.grandparent_index].largest.encode(),
            ) == Ordering::Greater
        {
            if self.seen_key {
                self.overlapped_bytes += self.grandparents[self.grandparent_index].file_size;
            }
            self.grandparent_index += 1;
        }
        self.seen_key = true;

        if self.overlapped_bytes > self.max_grandparent_overlap_bytes {
            self.overlapped_bytes = 0;
            true
        } else {
            false
        }
    }
}
