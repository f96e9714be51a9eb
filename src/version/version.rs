use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::Ordering as AtomicOrdering;

use parking_lot::Mutex;

use crate::cache::TableCache;
use crate::comparator::{Comparator, InternalKeyComparator};
use crate::error::Result;
use crate::iterator::BoxedIterator;
use crate::options::{Options, ReadOptions};
use crate::types::{
    InternalKey, Lookup, LookupKey, MAX_SEQUENCE_NUMBER, ParsedInternalKey, VALUE_TYPE_FOR_SEEK,
    ValueType,
};
use crate::version::level_iter::LevelIterator;
use crate::version::{
    FileMetaData, NUM_LEVELS, max_bytes_for_level, max_grandparent_overlap_bytes, total_file_size,
};

/// The first file a lookup read without finding the key, charged a seek when
/// the lookup had to go on to another file.
#[derive(Debug, Default, Clone)]
pub struct GetStats {
    pub seek_file: Option<(Arc<FileMetaData>, usize)>,
}

/// The set of table files at each level at one point in time.
///
/// Immutable once installed, apart from the seek-compaction candidate, which
/// reads record as they miss.
pub struct Version {
    icmp: InternalKeyComparator,
    pub(crate) files: Vec<Vec<Arc<FileMetaData>>>,
    /// Level that most needs compaction and how badly (>= 1 means it should
    /// be compacted). Set by `finalize`.
    pub(crate) compaction_score: f64,
    pub(crate) compaction_level: usize,
    file_to_compact: Mutex<Option<(Arc<FileMetaData>, usize)>>,
}

impl Version {
    pub fn new(icmp: InternalKeyComparator) -> Self {
        Version {
            icmp,
            files: vec![Vec::new(); NUM_LEVELS],
            compaction_score: -1.0,
            compaction_level: 0,
            file_to_compact: Mutex::new(None),
        }
    }

    pub fn files(&self, level: usize) -> &[Arc<FileMetaData>] {
        &self.files[level]
    }

    pub fn num_files(&self, level: usize) -> usize {
        self.files[level].len()
    }

    pub fn level_bytes(&self, level: usize) -> u64 {
        total_file_size(&self.files[level])
    }

    pub fn compaction_score(&self) -> f64 {
        self.compaction_score
    }

    pub fn compaction_level(&self) -> usize {
        self.compaction_level
    }

    pub fn file_to_compact(&self) -> Option<(Arc<FileMetaData>, usize)> {
        self.file_to_compact.lock().clone()
    }

    pub fn needs_compaction(&self) -> bool {
        self.compaction_score >= 1.0 || self.file_to_compact.lock().is_some()
    }

    /// Compute the best level to compact next.
    pub fn finalize(&mut self, options: &Options) {
        let mut best_level = 0;
        let mut best_score = -1.0;
        for level in 0..NUM_LEVELS - 1 {
            let score = if level == 0 {
                // Bounded by file count: every level-0 file is read on a
                // miss, and with small write buffers byte counts say little.
                self.files[0].len() as f64 / options.l0_compaction_trigger as f64
            } else {
                self.level_bytes(level) as f64 / max_bytes_for_level(options, level)
            };
            if score > best_score {
                best_level = level;
                best_score = score;
            }
        }
        self.compaction_level = best_level;
        self.compaction_score = best_score;
    }

    /// Look `key` up in the tables, newest data first. Level 0 files may
    /// overlap, so each one holding the key is tried newest first. Deeper
    /// levels are disjoint: only the first file whose largest key is >= the
    /// key can hold it, and only if the key is not below its smallest key.
    pub fn get(
        &self,
        options: &ReadOptions,
        key: &LookupKey,
        table_cache: &TableCache,
    ) -> Result<(Option<Lookup>, GetStats)> {
        let ikey = key.internal_key();
        let user_key = key.user_key();
        let ucmp = self.icmp.user_comparator();

        let mut stats = GetStats::default();
        let mut last_file_read: Option<(Arc<FileMetaData>, usize)> = None;

        for level in 0..NUM_LEVELS {
            let files = &self.files[level];
            if files.is_empty() {
                continue;
            }

            let candidates: Vec<Arc<FileMetaData>> = if level == 0 {
                let mut tmp: Vec<_> = files
                    .iter()
                    .filter(|f| {
                        ucmp.compare(user_key, f.smallest.user_key()) != Ordering::Less
                            && ucmp.compare(user_key, f.largest.user_key()) != Ordering::Greater
                    })
                    .cloned()
                    .collect();
                tmp.sort_by(|a, b| b.number.cmp(&a.number));
                tmp
            } else {
                let index = find_file(&self.icmp, files, ikey);
                match files.get(index) {
                    Some(f) if ucmp.compare(user_key, f.smallest.user_key()) != Ordering::Less => {
                        vec![Arc::clone(f)]
                    }
                    _ => Vec::new(),
                }
            };

            for f in candidates {
                if stats.seek_file.is_none() && last_file_read.is_some() {
                    // More than one file was needed: charge the first.
                    stats.seek_file = last_file_read.take();
                }
                last_file_read = Some((Arc::clone(&f), level));

                let Some((found_key, value)) =
                    table_cache.internal_get(options, f.number, f.file_size, ikey)?
                else {
                    continue;
                };
                let parsed = ParsedInternalKey::parse(&found_key)?;
                if ucmp.compare(parsed.user_key, user_key) != Ordering::Equal {
                    continue;
                }
                let lookup = match parsed.value_type {
                    ValueType::Value => Lookup::Value(value),
                    ValueType::Deletion => Lookup::Deleted,
                };
                return Ok((Some(lookup), stats));
            }
        }
        Ok((None, stats))
    }

    /// Charge a seek to the file a lookup missed in. Returns true when that
    /// file just became due for compaction.
    pub fn update_stats(&self, stats: &GetStats) -> bool {
        let Some((f, level)) = &stats.seek_file else {
            return false;
        };
        let left = f.allowed_seeks.fetch_sub(1, AtomicOrdering::Relaxed) - 1;
        let mut file_to_compact = self.file_to_compact.lock();
        if left <= 0 && file_to_compact.is_none() {
            *file_to_compact = Some((Arc::clone(f), *level));
            return true;
        }
        false
    }

    /// Whether any file in `level` overlaps the user key range
    /// [smallest, largest]. `None` bounds are open.
    pub fn overlap_in_level(
        &self,
        level: usize,
        smallest: Option<&[u8]>,
        largest: Option<&[u8]>,
    ) -> bool {
        let ucmp = self.icmp.user_comparator();
        let files = &self.files[level];
        let after_file = |f: &FileMetaData| {
            smallest.is_some_and(|k| ucmp.compare(k, f.largest.user_key()) == Ordering::Greater)
        };
        let before_file = |f: &FileMetaData| {
            largest.is_some_and(|k| ucmp.compare(k, f.smallest.user_key()) == Ordering::Less)
        };

        if level == 0 {
            return files.iter().any(|f| !after_file(f) && !before_file(f));
        }

        let index = match smallest {
            Some(k) => {
                let start = InternalKey::new(k, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
                find_file(&self.icmp, files, start.encode())
            }
            None => 0,
        };
        match files.get(index) {
            Some(f) => !before_file(f),
            None => false,
        }
    }

    /// Level a flushed memtable covering [smallest, largest] should land in.
    /// Pushed below level 0 while it overlaps nothing in the next level and
    /// not too much in the one after, to save a round of compaction.
    pub fn pick_level_for_memtable_output(
        &self,
        options: &Options,
        smallest: &[u8],
        largest: &[u8],
    ) -> usize {
        let mut level = 0;
        if self.overlap_in_level(0, Some(smallest), Some(largest)) {
            return level;
        }
        let start = InternalKey::new(smallest, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
        let limit = InternalKey::new(largest, 0, ValueType::Deletion);
        while level < options.max_mem_compact_level {
            if self.overlap_in_level(level + 1, Some(smallest), Some(largest)) {
                break;
            }
            if level + 2 < NUM_LEVELS {
                let overlaps = self.get_overlapping_inputs(level + 2, Some(&start), Some(&limit));
                if total_file_size(&overlaps) > max_grandparent_overlap_bytes(options) {
                    break;
                }
            }
            level += 1;
        }
        level
    }

    /// Files in `level` overlapping the user key range of [begin, end].
    ///
    /// Level-0 files overlap each other, so a file that widens the range can
    /// pull in files already passed over: the scan restarts with the wider
    /// range until no file widens it.
    pub fn get_overlapping_inputs(
        &self,
        level: usize,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
    ) -> Vec<Arc<FileMetaData>> {
        let ucmp = self.icmp.user_comparator();
        let mut user_begin = begin.map(|k| k.user_key().to_vec());
        let mut user_end = end.map(|k| k.user_key().to_vec());
        let files = &self.files[level];

        let mut inputs = Vec::new();
        let mut i = 0;
        while i < files.len() {
            let f = &files[i];
            i += 1;
            let file_start = f.smallest.user_key();
            let file_limit = f.largest.user_key();
            if user_begin
                .as_deref()
                .is_some_and(|b| ucmp.compare(file_limit, b) == Ordering::Less)
            {
                continue;
            }
            if user_end
                .as_deref()
                .is_some_and(|e| ucmp.compare(file_start, e) == Ordering::Greater)
            {
                continue;
            }
            inputs.push(Arc::clone(f));
            if level == 0 {
                if user_begin
                    .as_deref()
                    .is_some_and(|b| ucmp.compare(file_start, b) == Ordering::Less)
                {
                    user_begin = Some(file_start.to_vec());
                    inputs.clear();
                    i = 0;
                } else if user_end
                    .as_deref()
                    .is_some_and(|e| ucmp.compare(file_limit, e) == Ordering::Greater)
                {
                    user_end = Some(file_limit.to_vec());
                    inputs.clear();
                    i = 0;
                }
            }
        }
        inputs
    }

    /// One iterator per level-0 file plus one concatenating iterator per
    /// deeper non-empty level.
    pub fn add_iterators(
        &self,
        options: &ReadOptions,
        table_cache: &Arc<TableCache>,
        iters: &mut Vec<BoxedIterator>,
    ) -> Result<()> {
        for f in &self.files[0] {
            iters.push(Box::new(table_cache.iter(options, f.number, f.file_size)?));
        }
        for level in 1..NUM_LEVELS {
            if !self.files[level].is_empty() {
                iters.push(Box::new(LevelIterator::new(
                    self.icmp.clone(),
                    self.files[level].clone(),
                    Arc::clone(table_cache),
                    *options,
                )));
            }
        }
        Ok(())
    }

    /// `files[ 3 1 0 0 0 0 0 ]`
    pub fn level_summary(&self) -> String {
        let counts: Vec<String> = self.files.iter().map(|f| f.len().to_string()).collect();
        format!("files[ {} ]", counts.join(" "))
    }
}

/// Index of the first file whose largest key is >= `key`, or `files.len()`.
/// `files` must be sorted and disjoint.
pub fn find_file(icmp: &InternalKeyComparator, files: &[Arc<FileMetaData>], key: &[u8]) -> usize {
    files.partition_point(|f| icmp.compare(f.largest.encode(), key) == Ordering::Less)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;

    fn icmp() -> InternalKeyComparator {
        InternalKeyComparator::new(Arc::new(BytewiseComparator))
    }

    fn file(number: u64, smallest: &str, largest: &str, size: u64) -> Arc<FileMetaData> {
        Arc::new(FileMetaData::new(
            number,
            size,
            InternalKey::new(smallest.as_bytes(), 100, ValueType::Value),
            InternalKey::new(largest.as_bytes(), 100, ValueType::Value),
        ))
    }

    #[test]
    fn find_file_binary_search() {
        let files = vec![file(1, "a", "c", 1), file(2, "e", "g", 1), file(3, "k", "m", 1)];
        let key = |k: &str| InternalKey::new(k.as_bytes(), 100, ValueType::Value);
        assert_eq!(find_file(&icmp(), &files, key("a").encode()), 0);
        assert_eq!(find_file(&icmp(), &files, key("d").encode()), 1);
        assert_eq!(find_file(&icmp(), &files, key("g").encode()), 1);
        assert_eq!(find_file(&icmp(), &files, key("h").encode()), 2);
        assert_eq!(find_file(&icmp(), &files, key("z").encode()), 3);
    }

    #[test]
    fn overlap_in_sorted_level() {
        let mut v = Version::new(icmp());
        v.files[1] = vec![file(1, "150", "200", 1), file(2, "400", "500", 1)];
        assert!(!v.overlap_in_level(1, Some(b"100"), Some(b"149")));
        assert!(!v.overlap_in_level(1, Some(b"201"), Some(b"300")));
        assert!(!v.overlap_in_level(1, Some(b"501"), None));
        assert!(v.overlap_in_level(1, Some(b"100"), Some(b"150")));
        assert!(v.overlap_in_level(1, Some(b"450"), Some(b"600")));
        assert!(v.overlap_in_level(1, None, Some(b"160")));
        assert!(v.overlap_in_level(1, None, None));
    }

    #[test]
    fn overlap_in_level_zero_checks_every_file() {
        let mut v = Version::new(icmp());
        v.files[0] = vec![file(2, "400", "500", 1), file(1, "150", "600", 1)];
        assert!(v.overlap_in_level(0, Some(b"550"), Some(b"560")));
        assert!(!v.overlap_in_level(0, Some(b"601"), Some(b"700")));
    }
}
