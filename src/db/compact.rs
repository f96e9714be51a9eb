use std::cmp::Ordering;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::thread;
use std::time::Instant;

use log::{debug, error, info, warn};
use parking_lot::MutexGuard;

use crate::compaction::{Compaction, CompactionStats};
use crate::db::builder::build_table;
use crate::db::{DbInner, DbState, ManualCompaction};
use crate::error::{Error, Result};
use crate::filename::{FileType, parse_file_name, table_file_name};
use crate::iterator::StorageIterator;
use crate::memtable::MemTable;
use crate::options::ReadOptions;
use crate::sstable::TableBuilder;
use crate::types::{
    InternalKey, MAX_SEQUENCE_NUMBER, ParsedInternalKey, SequenceNumber, VALUE_TYPE_FOR_SEEK,
    ValueType,
};
use crate::version::{Version, VersionEdit};

/// A table produced by a compaction.
struct Output {
    number: u64,
    file_size: u64,
    smallest: InternalKey,
    largest: InternalKey,
}

/// Per job bookkeeping for `do_compaction_work`.
#[derive(Default)]
struct CompactionOutputs {
    outputs: Vec<Output>,
    builder: Option<TableBuilder>,
    total_bytes: u64,
}

impl CompactionOutputs {
    fn current(&mut self) -> Option<&mut Output> {
        self.outputs.last_mut()
    }
}

impl DbInner {
    /// One pass of the background thread.
    pub(crate) fn background_call(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.bg_compaction_scheduled);

        if !state.shutting_down {
            match self.background_compaction(&mut state) {
                Ok(()) => {
                    if state.bg_error_retryable {
                        info!("background work recovered; clearing error");
                        state.bg_error = None;
                        state.bg_error_retryable = false;
                    }
                }
                Err(_) if state.shutting_down => {}
                Err(e) => {
                    error!("background compaction failed: {}", e);
                    if state.bg_error.is_none() {
                        state.bg_error = Some(e);
                        state.bg_error_retryable = true;
                    }
                    // Wake anyone waiting so they see the error, then back
                    // off before retrying so a persistent fault does not spin.
                    self.bg_cv.notify_all();
                    let backoff = self.options.background_error_backoff;
                    MutexGuard::unlocked(&mut state, || thread::sleep(backoff));
                }
            }
        }

        state.bg_compaction_scheduled = false;
        // The pass may have produced more work, e.g. too many files in a level.
        self.maybe_schedule_compaction(&mut state);
        self.bg_cv.notify_all();
    }

    fn background_compaction(&self, state: &mut MutexGuard<'_, DbState>) -> Result<()> {
        if state.imm.is_some() {
            return self.compact_memtable(state);
        }

        let st = &mut **state;
        let manual = st.manual.as_mut().filter(|m| !m.done);
        let is_manual = manual.is_some();
        let mut manual_end = None;
        let compaction = match manual {
            Some(m) => {
                let c = st
                    .versions
                    .compact_range(m.level, m.begin.as_ref(), m.end.as_ref());
                m.done = c.is_none();
                if let Some(c) = &c {
                    let last = c.num_input_files(0) - 1;
                    manual_end = Some(c.input(0, last).largest.clone());
                }
                info!(
                    "manual compaction at level-{} from {:?} to {:?}; will stop at {:?}",
                    m.level, m.begin, m.end, manual_end
                );
                c
            }
            None => st.versions.pick_compaction(),
        };

        let result = match compaction {
            None => Ok(()),
            Some(c) if !is_manual && c.is_trivial_move() => self.trivial_move(state, c),
            Some(c) => {
                let result = self.do_compaction_work(state, c);
                self.delete_obsolete_files(state);
                result
            }
        };

        if let Err(e) = &result {
            if !state.shutting_down {
                error!("compaction error: {}", e);
            }
        }

        if is_manual {
            if let Some(m) = state.manual.as_mut() {
                if result.is_err() {
                    m.done = true;
                }
                if !m.done {
                    // Only part of the range was compacted; pick up after it.
                    m.begin = manual_end;
                }
            }
        }
        result
    }

    fn trivial_move(&self, state: &mut MutexGuard<'_, DbState>, mut c: Compaction) -> Result<()> {
        let level = c.level();
        let f = Arc::clone(c.input(0, 0));
        let edit = c.edit_mut();
        edit.delete_file(level, f.number);
        edit.add_file(
            level + 1,
            f.number,
            f.file_size,
            f.smallest.clone(),
            f.largest.clone(),
        );
        state.versions.log_and_apply(c.edit_mut())?;
        info!(
            "moved #{} to level-{} {} bytes: {}",
            f.number,
            level + 1,
            f.file_size,
            state.versions.level_summary()
        );
        Ok(())
    }

    /// Flush the immutable memtable to a table and record it in a new
    /// version. The log it came from is obsolete afterwards.
    pub(crate) fn compact_memtable(&self, state: &mut MutexGuard<'_, DbState>) -> Result<()> {
        let Some(imm) = state.imm.clone() else {
            return Ok(());
        };
        let mut edit = VersionEdit::new();
        let base = state.versions.current();
        self.write_level0_table(state, &imm, &mut edit, Some(&base))?;
        drop(base);

        if state.shutting_down {
            return Err(Error::ShuttingDown);
        }

        edit.set_prev_log_number(0);
        edit.set_log_number(state.log_file_number);
        state.versions.log_and_apply(&mut edit)?;

        state.imm = None;
        self.set_has_imm(false);
        self.delete_obsolete_files(state);
        Ok(())
    }

    /// Write `mem` to a new table and add it to `edit`. With a `base`
    /// version the table may be placed below level 0 when nothing there
    /// overlaps it.
    pub(crate) fn write_level0_table(
        &self,
        state: &mut MutexGuard<'_, DbState>,
        mem: &Arc<MemTable>,
        edit: &mut VersionEdit,
        base: Option<&Version>,
    ) -> Result<()> {
        let start = Instant::now();
        let number = state.versions.new_file_number();
        state.pending_outputs.insert(number);
        info!("level-0 table #{}: started", number);

        let mut iter = mem.iter();
        let result = MutexGuard::unlocked(state, || {
            build_table(&self.dbname, &self.options, &self.table_cache, &mut iter, number)
        });
        state.pending_outputs.remove(&number);

        let meta = match result {
            Ok(meta) => meta,
            Err(e) => {
                error!("level-0 table #{}: {}", number, e);
                return Err(e);
            }
        };

        let mut stats = CompactionStats {
            duration: start.elapsed(),
            ..CompactionStats::default()
        };
        let mut level = 0;
        if let Some(meta) = meta {
            info!("level-0 table #{}: {} bytes", number, meta.file_size);
            if let Some(base) = base {
                level = base.pick_level_for_memtable_output(
                    &self.options,
                    meta.smallest.user_key(),
                    meta.largest.user_key(),
                );
            }
            stats.bytes_written = meta.file_size;
            stats.count = 1;
            edit.add_file(level, meta.number, meta.file_size, meta.smallest, meta.largest);
        } else {
            info!("level-0 table #{}: empty memtable, nothing written", number);
        }
        state.compaction_stats[level] += stats;
        Ok(())
    }

    /// Merge the inputs of `c` into new tables in the next level down,
    /// dropping entries no reader can see.
    fn do_compaction_work(&self, state: &mut MutexGuard<'_, DbState>, mut c: Compaction) -> Result<()> {
        let start = Instant::now();
        info!(
            "compacting {}@{} + {}@{} files",
            c.num_input_files(0),
            c.level(),
            c.num_input_files(1),
            c.level() + 1
        );

        let smallest_snapshot = state
            .snapshots
            .oldest()
            .unwrap_or_else(|| state.versions.last_sequence());
        let mut input = state.versions.make_input_iterator(&c)?;
        let mut outputs = CompactionOutputs::default();

        let result = MutexGuard::unlocked(state, || {
            self.run_compaction(&mut c, &mut input, smallest_snapshot, &mut outputs)
        });
        drop(input);

        let result = match (result, outputs.builder.take()) {
            (Err(e), Some(mut builder)) => {
                builder.abandon();
                Err(e)
            }
            (result, _) => result,
        };

        let mut stats = CompactionStats {
            duration: start.elapsed(),
            bytes_written: outputs.total_bytes,
            count: 1,
            ..CompactionStats::default()
        };
        for which in 0..2 {
            for i in 0..c.num_input_files(which) {
                stats.bytes_read += c.input(which, i).file_size;
            }
        }
        state.compaction_stats[c.level() + 1] += stats;

        let result = result.and_then(|()| self.install_compaction_results(state, &mut c, &outputs));
        for out in &outputs.outputs {
            state.pending_outputs.remove(&out.number);
        }
        result?;
        info!("compacted to: {}", state.versions.level_summary());
        Ok(())
    }

    fn run_compaction(
        &self,
        c: &mut Compaction,
        input: &mut dyn StorageIterator,
        smallest_snapshot: SequenceNumber,
        outputs: &mut CompactionOutputs,
    ) -> Result<()> {
        let ucmp = Arc::clone(self.icmp.user_comparator());
        let mut current_user_key: Option<Vec<u8>> = None;
        let mut last_sequence_for_key = MAX_SEQUENCE_NUMBER;

        input.seek_to_first()?;
        while input.is_valid() {
            if self.shutting_down() {
                return Err(Error::ShuttingDown);
            }
            // A full memtable stalls writers; flush it ahead of the rest of
            // this job.
            if self.has_imm.load(AtomicOrdering::Acquire) {
                let mut state = self.state.lock();
                if state.imm.is_some() {
                    self.compact_memtable(&mut state)?;
                    self.bg_cv.notify_all();
                }
            }

            let key = input.key().to_vec();
            // Called for every key so the grandparent cursor keeps up.
            if c.should_stop_before(&key) && outputs.builder.is_some() {
                self.finish_compaction_output_file(outputs)?;
            }

            let mut drop_entry = false;
            match ParsedInternalKey::parse(&key) {
                Err(_) => {
                    // Keep unparsable keys rather than lose data silently.
                    current_user_key = None;
                    last_sequence_for_key = MAX_SEQUENCE_NUMBER;
                }
                Ok(ikey) => {
                    let first_occurrence = current_user_key
                        .as_deref()
                        .is_none_or(|k| ucmp.compare(ikey.user_key, k) != Ordering::Equal);
                    if first_occurrence {
                        current_user_key = Some(ikey.user_key.to_vec());
                        last_sequence_for_key = MAX_SEQUENCE_NUMBER;
                    }

                    if last_sequence_for_key <= smallest_snapshot {
                        // Shadowed by a newer entry every reader can see.
                        drop_entry = true;
                    } else if ikey.value_type == ValueType::Deletion
                        && ikey.sequence <= smallest_snapshot
                        && c.is_base_level_for_key(ikey.user_key)
                    {
                        // Nothing older survives below, and later entries for
                        // this key in this job are dropped by the rule above.
                        drop_entry = true;
                    }
                    last_sequence_for_key = ikey.sequence;
                }
            }

            if !drop_entry {
                if outputs.builder.is_none() {
                    self.open_compaction_output_file(outputs)?;
                }
                if let Some(builder) = outputs.builder.as_mut() {
                    builder.add(&key, input.value())?;
                    let reached_limit = builder.file_size() >= c.max_output_file_size();
                    let first = builder.num_entries() == 1;
                    if let Some(out) = outputs.current() {
                        if first {
                            out.smallest = InternalKey::decode_from(&key);
                        }
                        out.largest = InternalKey::decode_from(&key);
                    }
                    if reached_limit {
                        self.finish_compaction_output_file(outputs)?;
                    }
                }
            }

            input.next()?;
        }

        if self.shutting_down() {
            return Err(Error::ShuttingDown);
        }
        if outputs.builder.is_some() {
            self.finish_compaction_output_file(outputs)?;
        }
        Ok(())
    }

    fn open_compaction_output_file(&self, outputs: &mut CompactionOutputs) -> Result<()> {
        let number = {
            let mut state = self.state.lock();
            let number = state.versions.new_file_number();
            state.pending_outputs.insert(number);
            number
        };
        let builder = TableBuilder::new(&table_file_name(&self.dbname, number), &self.options)?;
        outputs.outputs.push(Output {
            number,
            file_size: 0,
            smallest: InternalKey::default(),
            largest: InternalKey::default(),
        });
        outputs.builder = Some(builder);
        Ok(())
    }

    fn finish_compaction_output_file(&self, outputs: &mut CompactionOutputs) -> Result<()> {
        let Some(mut builder) = outputs.builder.take() else {
            return Ok(());
        };
        let entries = builder.num_entries();
        let file_size = builder.finish()?;
        outputs.total_bytes += file_size;
        let Some(out) = outputs.current() else {
            return Ok(());
        };
        out.file_size = file_size;
        let number = out.number;

        if entries > 0 {
            // Make sure the new table is readable before it is installed.
            self.table_cache
                .iter(&ReadOptions::default(), number, file_size)?;
            info!("generated table #{}: {} keys, {} bytes", number, entries, file_size);
        }
        Ok(())
    }

    fn install_compaction_results(
        &self,
        state: &mut MutexGuard<'_, DbState>,
        c: &mut Compaction,
        outputs: &CompactionOutputs,
    ) -> Result<()> {
        info!(
            "compacted {}@{} + {}@{} files => {} bytes",
            c.num_input_files(0),
            c.level(),
            c.num_input_files(1),
            c.level() + 1,
            outputs.total_bytes
        );
        c.add_input_deletions();
        let level = c.level() + 1;
        for out in &outputs.outputs {
            c.edit_mut().add_file(
                level,
                out.number,
                out.file_size,
                out.smallest.clone(),
                out.largest.clone(),
            );
        }
        state.versions.log_and_apply(c.edit_mut())
    }

    /// Remove files no version, pending output or recovery step needs.
    pub(crate) fn delete_obsolete_files(&self, state: &mut MutexGuard<'_, DbState>) {
        if state.bg_error.is_some() {
            // After an error we cannot tell whether the last edit committed.
            return;
        }
        let mut live = state.versions.live_files();
        live.extend(state.pending_outputs.iter().copied());
        let log_number = state.versions.log_number();
        let prev_log_number = state.versions.prev_log_number();
        let manifest_number = state.versions.manifest_file_number();

        let entries = match fs::read_dir(&self.dbname) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("listing {}: {}", self.dbname.display(), e);
                return;
            }
        };

        let mut doomed: Vec<(PathBuf, FileType, u64)> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some((number, file_type)) = name.to_str().and_then(parse_file_name) else {
                continue;
            };
            let keep = match file_type {
                FileType::Log => number >= log_number || number == prev_log_number,
                FileType::Manifest => number >= manifest_number,
                FileType::Table | FileType::Temp => live.contains(&number),
                FileType::Current => true,
            };
            if !keep {
                if file_type == FileType::Table {
                    self.table_cache.evict(number);
                }
                doomed.push((entry.path(), file_type, number));
            }
        }

        MutexGuard::unlocked(state, || {
            for (path, file_type, number) in doomed {
                info!("delete {:?} #{}", file_type, number);
                if let Err(e) = fs::remove_file(&path) {
                    warn!("deleting {}: {}", path.display(), e);
                }
            }
        });
    }

    /// Compact `level` over the user key range [begin, end], one background
    /// step at a time, and wait for it to finish.
    pub(crate) fn manual_compaction(
        &self,
        level: usize,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        while state.manual.is_some() && !state.shutting_down {
            self.bg_cv.wait(&mut state);
        }
        let id = state.next_manual_id;
        state.next_manual_id += 1;
        state.manual = Some(ManualCompaction {
            id,
            level,
            begin: begin.map(|k| InternalKey::new(k, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK)),
            end: end.map(|k| InternalKey::new(k, 0, ValueType::Deletion)),
            done: false,
        });

        loop {
            let done = state.manual.as_ref().is_none_or(|m| m.id != id || m.done);
            if done || state.shutting_down || state.bg_error.is_some() {
                break;
            }
            self.maybe_schedule_compaction(&mut state);
            self.bg_cv.wait(&mut state);
        }
        if state.manual.as_ref().is_some_and(|m| m.id == id) {
            state.manual = None;
        }
        // Let another manual compaction waiting for the slot proceed.
        self.bg_cv.notify_all();
        debug!("manual compaction of level-{} finished", level);

        if state.shutting_down {
            return Err(Error::ShuttingDown);
        }
        match &state.bg_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
