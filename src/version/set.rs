use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::cache::TableCache;
use crate::compaction::Compaction;
use crate::comparator::{Comparator, InternalKeyComparator};
use crate::error::{Error, Result};
use crate::filename::{descriptor_file_name, read_current_file, set_current_file};
use crate::iterator::{BoxedIterator, MergingIterator};
use crate::options::{Options, ReadOptions};
use crate::types::{InternalKey, SequenceNumber};
use crate::version::builder::VersionBuilder;
use crate::version::level_iter::LevelIterator;
use crate::version::{
    FileMetaData, NUM_LEVELS, Version, VersionEdit, expanded_compaction_byte_size_limit,
    total_file_size,
};
use crate::wal::{LogReader, LogWriter, SyncPolicy};

/// Owns the chain of versions, the file number allocator and the manifest.
///
/// Versions live in an arena keyed by a monotonic id. Readers hold `Arc`s to
/// the versions they use; a non-current version is dropped from the arena
/// once nobody else holds it, and its files stop counting as live.
pub struct VersionSet {
    dbname: PathBuf,
    options: Options,
    icmp: InternalKeyComparator,
    table_cache: Arc<TableCache>,

    next_file_number: u64,
    manifest_file_number: u64,
    last_sequence: SequenceNumber,
    log_number: u64,
    /// Log being compacted when the manifest was last written, 0 if none.
    prev_log_number: u64,

    descriptor_log: Option<LogWriter>,
    versions: BTreeMap<u64, Arc<Version>>,
    next_version_id: u64,
    current: Arc<Version>,
    /// Per level, the largest key of the last compaction there. The next
    /// size compaction of the level starts after it.
    compact_pointers: Vec<Option<InternalKey>>,
}

impl VersionSet {
    pub fn new(dbname: &Path, options: &Options, table_cache: Arc<TableCache>) -> Self {
        let icmp = InternalKeyComparator::new(Arc::clone(&options.comparator));
        let current = Arc::new(Version::new(icmp.clone()));
        let mut versions = BTreeMap::new();
        versions.insert(0, Arc::clone(&current));
        VersionSet {
            dbname: dbname.to_path_buf(),
            options: options.clone(),
            icmp,
            table_cache,
            next_file_number: 2,
            manifest_file_number: 0,
            last_sequence: 0,
            log_number: 0,
            prev_log_number: 0,
            descriptor_log: None,
            versions,
            next_version_id: 1,
            current,
            compact_pointers: vec![None; NUM_LEVELS],
        }
    }

    pub fn current(&self) -> Arc<Version> {
        Arc::clone(&self.current)
    }

    pub fn table_cache(&self) -> &Arc<TableCache> {
        &self.table_cache
    }

    pub fn new_file_number(&mut self) -> u64 {
        let n = self.next_file_number;
        self.next_file_number += 1;
        n
    }

    /// Give back a number from `new_file_number` that ended up unused.
    pub fn reuse_file_number(&mut self, number: u64) {
        if self.next_file_number == number + 1 {
            self.next_file_number = number;
        }
    }

    pub fn mark_file_number_used(&mut self, number: u64) {
        if self.next_file_number <= number {
            self.next_file_number = number + 1;
        }
    }

    pub fn next_file_number(&self) -> u64 {
        self.next_file_number
    }

    pub fn manifest_file_number(&self) -> u64 {
        self.manifest_file_number
    }

    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence
    }

    pub fn set_last_sequence(&mut self, sequence: SequenceNumber) {
        assert!(sequence >= self.last_sequence, "sequence numbers went backwards");
        self.last_sequence = sequence;
    }

    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    pub fn prev_log_number(&self) -> u64 {
        self.prev_log_number
    }

    pub fn num_level_files(&self, level: usize) -> usize {
        self.current.num_files(level)
    }

    pub fn num_level_bytes(&self, level: usize) -> u64 {
        self.current.level_bytes(level)
    }

    pub fn needs_compaction(&self) -> bool {
        self.current.needs_compaction()
    }

    /// Number of versions still referenced (current included).
    pub fn live_versions(&self) -> usize {
        self.versions
            .values()
            .filter(|v| Arc::strong_count(v) > 1)
            .count()
    }

    fn prune_versions(&mut self) {
        // The current version is also held by `self.current`.
        self.versions.retain(|_, v| Arc::strong_count(v) > 1);
    }

    fn append_version(&mut self, v: Arc<Version>) {
        let id = self.next_version_id;
        self.next_version_id += 1;
        self.versions.insert(id, Arc::clone(&v));
        self.current = v;
        self.prune_versions();
    }

    /// Every table referenced by a version somebody still holds.
    pub fn live_files(&mut self) -> HashSet<u64> {
        self.prune_versions();
        let mut live = HashSet::new();
        for v in self.versions.values() {
            for level in 0..NUM_LEVELS {
                live.extend(v.files(level).iter().map(|f| f.number));
            }
        }
        live
    }

    /// Apply `edit` to the current version, persist it to the manifest and
    /// make the result current. The DB mutex is held throughout.
    pub fn log_and_apply(&mut self, edit: &mut VersionEdit) -> Result<()> {
        match edit.log_number {
            Some(n) => {
                assert!(n >= self.log_number && n < self.next_file_number);
            }
            None => edit.set_log_number(self.log_number),
        }
        if edit.prev_log_number.is_none() {
            edit.set_prev_log_number(self.prev_log_number);
        }
        edit.set_next_file(self.next_file_number);
        edit.set_last_sequence(self.last_sequence);

        let mut v = Version::new(self.icmp.clone());
        {
            let mut builder = VersionBuilder::new(self.icmp.clone(), &self.current);
            builder.apply(edit);
            builder.save_to(&mut v);
        }
        self.apply_compact_pointers(edit);
        v.finalize(&self.options);

        // The first edit after open starts a fresh manifest, headed by a
        // snapshot of the whole current state.
        let mut new_manifest = None;
        if self.descriptor_log.is_none() {
            let path = descriptor_file_name(&self.dbname, self.manifest_file_number);
            let created = LogWriter::create(&path, SyncPolicy::Manual)
                .and_then(|mut log| self.write_snapshot(&mut log).map(|_| log));
            match created {
                Ok(log) => {
                    self.descriptor_log = Some(log);
                    new_manifest = Some(path);
                }
                Err(e) => {
                    let _ = fs::remove_file(&path);
                    return Err(e);
                }
            }
        }

        let result = match self.descriptor_log.as_mut() {
            Some(log) => log.add_record(&edit.encode()).and_then(|_| log.sync()),
            None => Err(Error::InvalidArgument("manifest is not open".into())),
        }
        .and_then(|_| match new_manifest {
            Some(_) => set_current_file(&self.dbname, self.manifest_file_number),
            None => Ok(()),
        });

        match result {
            Ok(()) => {
                self.append_version(Arc::new(v));
                self.log_number = edit.log_number.unwrap_or(self.log_number);
                self.prev_log_number = edit.prev_log_number.unwrap_or(0);
                Ok(())
            }
            Err(e) => {
                warn!("manifest write failed: {}", e);
                if let Some(path) = new_manifest {
                    self.descriptor_log = None;
                    let _ = fs::remove_file(path);
                }
                Err(e)
            }
        }
    }

    fn apply_compact_pointers(&mut self, edit: &VersionEdit) {
        for (level, key) in &edit.compact_pointers {
            self.compact_pointers[*level] = Some(key.clone());
        }
    }

    fn write_snapshot(&self, log: &mut LogWriter) -> Result<()> {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(self.icmp.user_comparator().name());
        for (level, pointer) in self.compact_pointers.iter().enumerate() {
            if let Some(key) = pointer {
                edit.set_compact_pointer(level, key.clone());
            }
        }
        for level in 0..NUM_LEVELS {
            for f in self.current.files(level) {
                edit.new_files.push((level, FileMetaData::clone(f)));
            }
        }
        log.add_record(&edit.encode())
    }

    /// Rebuild the current version from the manifest named by CURRENT.
    pub fn recover(&mut self) -> Result<()> {
        let current_name = read_current_file(&self.dbname)?;
        let manifest_path = self.dbname.join(&current_name);
        info!("recovering from manifest {}", manifest_path.display());

        let mut log_number = None;
        let mut prev_log_number = None;
        let mut next_file_number = None;
        let mut last_sequence = None;

        let base = Arc::clone(&self.current);
        let mut builder = VersionBuilder::new(self.icmp.clone(), &base);
        let reader = LogReader::open(&manifest_path, true)?;
        for record in reader.records() {
            let edit = VersionEdit::decode(&record?)?;
            if let Some(name) = &edit.comparator {
                let expected = self.icmp.user_comparator().name();
                if name != expected {
                    return Err(Error::InvalidArgument(format!(
                        "{} does not match existing comparator {}",
                        expected, name
                    )));
                }
            }
            builder.apply(&edit);
            self.apply_compact_pointers(&edit);

            log_number = edit.log_number.or(log_number);
            prev_log_number = edit.prev_log_number.or(prev_log_number);
            next_file_number = edit.next_file_number.or(next_file_number);
            last_sequence = edit.last_sequence.or(last_sequence);
        }

        let next_file_number = next_file_number
            .ok_or_else(|| Error::Corruption("no meta-nextfile entry in descriptor".into()))?;
        let log_number = log_number
            .ok_or_else(|| Error::Corruption("no meta-lognumber entry in descriptor".into()))?;
        let last_sequence = last_sequence
            .ok_or_else(|| Error::Corruption("no last-sequence-number entry in descriptor".into()))?;
        let prev_log_number = prev_log_number.unwrap_or(0);

        let mut v = Version::new(self.icmp.clone());
        builder.save_to(&mut v);
        drop(builder);
        v.finalize(&self.options);
        self.append_version(Arc::new(v));

        // The recovered manifest is left behind; the next log_and_apply
        // starts a new one under a fresh number.
        self.next_file_number = next_file_number;
        self.mark_file_number_used(prev_log_number);
        self.mark_file_number_used(log_number);
        self.manifest_file_number = self.new_file_number();
        self.last_sequence = last_sequence;
        self.log_number = log_number;
        self.prev_log_number = prev_log_number;

        info!(
            "recovered {} last_seq={} log={} next_file={}",
            self.current.level_summary(),
            self.last_sequence,
            self.log_number,
            self.next_file_number
        );
        Ok(())
    }

    /// Manifest for a brand new database: comparator, log 0, next file 2,
    /// sequence 0. MANIFEST-000001 becomes current.
    pub fn create_new_db(&mut self) -> Result<()> {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(self.icmp.user_comparator().name());
        edit.set_log_number(0);
        edit.set_next_file(2);
        edit.set_last_sequence(0);

        let path = descriptor_file_name(&self.dbname, 1);
        let result = LogWriter::create(&path, SyncPolicy::Manual)
            .and_then(|mut log| {
                log.add_record(&edit.encode())?;
                log.sync()
            })
            .and_then(|_| set_current_file(&self.dbname, 1));
        if result.is_err() {
            let _ = fs::remove_file(&path);
        }
        result
    }

    /// Choose the next automatic compaction. Size pressure wins over seek
    /// pressure.
    pub fn pick_compaction(&mut self) -> Option<Compaction> {
        let current = Arc::clone(&self.current);
        let (level, inputs) = if current.compaction_score() >= 1.0 {
            let level = current.compaction_level();
            let files = current.files(level);
            // Round robin: first file past the level's compact pointer.
            let next = files.iter().find(|f| match &self.compact_pointers[level] {
                Some(ptr) => {
                    self.icmp.compare(f.largest.encode(), ptr.encode()) == Ordering::Greater
                }
                None => true,
            });
            let first = next.or_else(|| files.first())?;
            (level, vec![Arc::clone(first)])
        } else if let Some((f, level)) = current.file_to_compact() {
            (level, vec![f])
        } else {
            return None;
        };

        let mut c = Compaction::new(&self.options, level, Arc::clone(&current), self.icmp.clone());
        c.inputs[0] = inputs;

        // Level-0 files overlap each other: take every one that overlaps the
        // chosen range.
        if level == 0 {
            let (smallest, largest) = self.get_range(&c.inputs[0]);
            c.inputs[0] = current.get_overlapping_inputs(0, Some(&smallest), Some(&largest));
        }

        self.setup_other_inputs(&mut c);
        Some(c)
    }

    /// Compaction of the files in `level` overlapping [begin, end], or
    /// `None` when there are none.
    pub fn compact_range(
        &mut self,
        level: usize,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
    ) -> Option<Compaction> {
        let current = Arc::clone(&self.current);
        let mut inputs = current.get_overlapping_inputs(level, begin, end);
        if inputs.is_empty() {
            return None;
        }

        // Cap the work of one pass. Level-0 files overlap, so dropping some
        // of them could leave older data below newer.
        if level > 0 {
            let limit = self.options.max_file_size;
            let mut total = 0;
            for i in 0..inputs.len() {
                total += inputs[i].file_size;
                if total >= limit {
                    inputs.truncate(i + 1);
                    break;
                }
            }
        }

        let mut c = Compaction::new(&self.options, level, current, self.icmp.clone());
        c.inputs[0] = inputs;
        self.setup_other_inputs(&mut c);
        Some(c)
    }

    fn setup_other_inputs(&mut self, c: &mut Compaction) {
        let level = c.level();
        let current = Arc::clone(c.input_version());

        let (smallest, mut largest) = self.get_range(&c.inputs[0]);
        c.inputs[1] = current.get_overlapping_inputs(level + 1, Some(&smallest), Some(&largest));
        let (mut all_start, mut all_limit) = self.get_range2(&c.inputs[0], &c.inputs[1]);

        // Grow the level inputs if that pulls in no new level+1 files.
        if !c.inputs[1].is_empty() {
            let expanded0 = current.get_overlapping_inputs(level, Some(&all_start), Some(&all_limit));
            let inputs1_size = total_file_size(&c.inputs[1]);
            let expanded0_size = total_file_size(&expanded0);
            if expanded0.len() > c.inputs[0].len()
                && inputs1_size + expanded0_size < expanded_compaction_byte_size_limit(&self.options)
            {
                let (new_start, new_limit) = self.get_range(&expanded0);
                let expanded1 =
                    current.get_overlapping_inputs(level + 1, Some(&new_start), Some(&new_limit));
                if expanded1.len() == c.inputs[1].len() {
                    info!(
                        "expanding compaction@{} {}+{} ({}+{} bytes) to {}+{} ({}+{} bytes)",
                        level,
                        c.inputs[0].len(),
                        c.inputs[1].len(),
                        total_file_size(&c.inputs[0]),
                        inputs1_size,
                        expanded0.len(),
                        expanded1.len(),
                        expanded0_size,
                        inputs1_size
                    );
                    largest = new_limit;
                    c.inputs[0] = expanded0;
                    c.inputs[1] = expanded1;
                    (all_start, all_limit) = self.get_range2(&c.inputs[0], &c.inputs[1]);
                }
            }
        }

        if level + 2 < NUM_LEVELS {
            c.grandparents =
                current.get_overlapping_inputs(level + 2, Some(&all_start), Some(&all_limit));
        }

        // Updated now rather than when the compaction is installed, so a
        // failed compaction moves on to a different key range next time.
        self.compact_pointers[level] = Some(largest.clone());
        c.edit_mut().set_compact_pointer(level, largest);
    }

    /// Smallest and largest internal key across `files` (non-empty).
    fn get_range(&self, files: &[Arc<FileMetaData>]) -> (InternalKey, InternalKey) {
        let mut smallest = &files[0].smallest;
        let mut largest = &files[0].largest;
        for f in &files[1..] {
            if self.icmp.compare(f.smallest.encode(), smallest.encode()) == Ordering::Less {
                smallest = &f.smallest;
            }
            if self.icmp.compare(f.largest.encode(), largest.encode()) == Ordering::Greater {
                largest = &f.largest;
            }
        }
        (smallest.clone(), largest.clone())
    }

    fn get_range2(
        &self,
        a: &[Arc<FileMetaData>],
        b: &[Arc<FileMetaData>],
    ) -> (InternalKey, InternalKey) {
        let all: Vec<Arc<FileMetaData>> = a.iter().chain(b.iter()).cloned().collect();
        self.get_range(&all)
    }

    /// Merged view over every input of `c`, for the compaction job.
    pub fn make_input_iterator(&self, c: &Compaction) -> Result<MergingIterator> {
        let options = ReadOptions {
            verify_checksums: self.options.paranoid_checks,
            fill_cache: false,
            snapshot: None,
        };
        let mut iters: Vec<BoxedIterator> = Vec::new();
        for which in 0..2 {
            let files = &c.inputs[which];
            if files.is_empty() {
                continue;
            }
            if c.level() + which == 0 {
                for f in files {
                    iters.push(Box::new(self.table_cache.iter(&options, f.number, f.file_size)?));
                }
            } else {
                iters.push(Box::new(LevelIterator::new(
                    self.icmp.clone(),
                    files.clone(),
                    Arc::clone(&self.table_cache),
                    options,
                )));
            }
        }
        let cmp: Arc<dyn Comparator> = Arc::new(self.icmp.clone());
        Ok(MergingIterator::new(cmp, iters))
    }

    pub fn level_summary(&self) -> String {
        self.current.level_summary()
    }
}
