use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::comparator::{Comparator, InternalKeyComparator};
use crate::version::{FileMetaData, NUM_LEVELS, Version, VersionEdit};

#[derive(Default)]
struct LevelState {
    deleted: HashSet<u64>,
    added: Vec<Arc<FileMetaData>>,
}

/// Accumulates a run of edits on top of a base version without building the
/// intermediate versions (recovery replays whole manifests this way).
pub struct VersionBuilder<'a> {
    icmp: InternalKeyComparator,
    base: &'a Version,
    levels: Vec<LevelState>,
}

impl<'a> VersionBuilder<'a> {
    pub fn new(icmp: InternalKeyComparator, base: &'a Version) -> Self {
        let levels = (0..NUM_LEVELS).map(|_| LevelState::default()).collect();
        VersionBuilder { icmp, base, levels }
    }

    pub fn apply(&mut self, edit: &VersionEdit) {
        for &(level, number) in &edit.deleted_files {
            self.levels[level].deleted.insert(number);
        }
        for (level, f) in &edit.new_files {
            let state = &mut self.levels[*level];
            state.deleted.remove(&f.number);
            state.added.push(Arc::new(f.clone()));
        }
    }

    /// Write base + edits into `v`, each level sorted by smallest key.
    pub fn save_to(&self, v: &mut Version) {
        for level in 0..NUM_LEVELS {
            let state = &self.levels[level];
            let mut files: Vec<Arc<FileMetaData>> = self
                .base
                .files(level)
                .iter()
                .chain(state.added.iter())
                .filter(|f| !state.deleted.contains(&f.number))
                .cloned()
                .collect();
            files.sort_by(|a, b| {
                match self.icmp.compare(a.smallest.encode(), b.smallest.encode()) {
                    Ordering::Equal => a.number.cmp(&b.number),
                    ord => ord,
                }
            });
            // A file re-added after deletion shows up once.
            files.dedup_by_key(|f| f.number);

            if level > 0 {
                for pair in files.windows(2) {
                    debug_assert_eq!(
                        self.icmp.compare(pair[0].largest.encode(), pair[1].smallest.encode()),
                        Ordering::Less,
                        "overlapping ranges in level {}",
                        level
                    );
                }
            }
            v.files[level] = files;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;
    use crate::types::{InternalKey, ValueType};

    fn ikey(k: &str) -> InternalKey {
        InternalKey::new(k.as_bytes(), 1, ValueType::Value)
    }

    #[test]
    fn apply_adds_sorted_and_deletes() {
        let icmp = InternalKeyComparator::new(Arc::new(BytewiseComparator));
        let base = Version::new(icmp.clone());

        let mut edit = VersionEdit::new();
        edit.add_file(1, 10, 100, ikey("m"), ikey("p"));
        edit.add_file(1, 11, 100, ikey("a"), ikey("c"));
        edit.add_file(0, 12, 100, ikey("a"), ikey("z"));
        let mut builder = VersionBuilder::new(icmp.clone(), &base);
        builder.apply(&edit);
        let mut v1 = Version::new(icmp.clone());
        builder.save_to(&mut v1);
        let numbers: Vec<u64> = v1.files(1).iter().map(|f| f.number).collect();
        assert_eq!(numbers, vec![11, 10]);
        assert_eq!(v1.num_files(0), 1);

        let mut edit = VersionEdit::new();
        edit.delete_file(1, 11);
        edit.delete_file(0, 12);
        let mut builder = VersionBuilder::new(icmp.clone(), &v1);
        builder.apply(&edit);
        let mut v2 = Version::new(icmp);
        builder.save_to(&mut v2);
        assert_eq!(v2.num_files(0), 0);
        assert_eq!(v2.files(1)[0].number, 10);
    }
}
