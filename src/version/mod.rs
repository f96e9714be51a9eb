//! Leveled file metadata: immutable versions, the edits between them, and the
//! manifest that persists those edits.

pub mod builder;
pub mod edit;
pub mod level_iter;
pub mod set;
#[allow(clippy::module_inception)]
pub mod version;

use std::sync::Arc;

pub use edit::{FileMetaData, VersionEdit};
pub use set::VersionSet;
pub use version::{GetStats, Version};

use crate::options::Options;

pub const NUM_LEVELS: usize = 7;

pub fn total_file_size(files: &[Arc<FileMetaData>]) -> u64 {
    files.iter().map(|f| f.file_size).sum()
}

/// Byte budget of `level` (level 0 is bounded by file count instead).
pub fn max_bytes_for_level(options: &Options, level: usize) -> f64 {
    let mut result = options.level1_max_bytes as f64;
    for _ in 1..level {
        result *= 10.0;
    }
    result
}

/// A new file stops growing once it overlaps this many grandparent bytes.
pub fn max_grandparent_overlap_bytes(options: &Options) -> u64 {
    10 * options.max_file_size
}

/// Ceiling on the total input bytes when widening a compaction.
pub fn expanded_compaction_byte_size_limit(options: &Options) -> u64 {
    25 * options.max_file_size
}
