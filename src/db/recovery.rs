use std::fs;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::batch::{BATCH_HEADER_SIZE, WriteBatch};
use crate::db::{DbInner, DbState};
use crate::error::{Error, Result};
use crate::filename::{FileType, current_file_name, log_file_name, parse_file_name};
use crate::memtable::MemTable;
use crate::types::SequenceNumber;
use crate::version::VersionEdit;
use crate::wal::{LogReader, LogWriter};

impl DbInner {
    /// Bring the directory to a consistent open state: create or recover the
    /// manifest, replay logs into level-0 tables, start a fresh log and
    /// clear out leftovers.
    pub(crate) fn open_state(&self) -> Result<()> {
        let mut state = self.state.lock();
        let mut edit = VersionEdit::new();
        self.recover(&mut state, &mut edit)?;

        let number = state.versions.new_file_number();
        let log = LogWriter::create(&log_file_name(&self.dbname, number), self.options.sync_policy)?;
        state.log = Some(Arc::new(Mutex::new(log)));
        state.log_file_number = number;

        // Older logs are now covered by tables in the edit.
        edit.set_prev_log_number(0);
        edit.set_log_number(number);
        state.versions.log_and_apply(&mut edit)?;

        self.delete_obsolete_files(&mut state);
        self.maybe_schedule_compaction(&mut state);
        info!(
            "opened {}: {} last_sequence={}",
            self.dbname.display(),
            state.versions.level_summary(),
            state.versions.last_sequence()
        );
        Ok(())
    }

    fn recover(&self, state: &mut MutexGuard<'_, DbState>, edit: &mut VersionEdit) -> Result<()> {
        fs::create_dir_all(&self.dbname)?;

        if !current_file_name(&self.dbname).exists() {
            if !self.options.create_if_missing {
                return Err(Error::InvalidArgument(format!(
                    "{}: does not exist (create_if_missing is false)",
                    self.dbname.display()
                )));
            }
            info!("creating new database at {}", self.dbname.display());
            state.versions.create_new_db()?;
        } else if self.options.error_if_exists {
            return Err(Error::InvalidArgument(format!(
                "{}: exists (error_if_exists is true)",
                self.dbname.display()
            )));
        }

        state.versions.recover()?;

        let min_log = state.versions.log_number();
        let prev_log = state.versions.prev_log_number();
        let mut expected = state.versions.live_files();
        let mut logs = Vec::new();
        for entry in fs::read_dir(&self.dbname)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some((number, file_type)) = name.to_str().and_then(parse_file_name) else {
                continue;
            };
            match file_type {
                FileType::Table => {
                    expected.remove(&number);
                }
                FileType::Log if number >= min_log || number == prev_log => logs.push(number),
                _ => {}
            }
        }
        if let Some(missing) = expected.iter().min() {
            return Err(Error::Corruption(format!(
                "{} missing table files; e.g. #{}",
                expected.len(),
                missing
            )));
        }

        // Replay oldest first so newer writes win.
        logs.sort_unstable();
        let mut max_sequence: SequenceNumber = 0;
        for &number in &logs {
            self.recover_log_file(state, number, edit, &mut max_sequence)?;
            // The log's number may be past what the manifest recorded.
            state.versions.mark_file_number_used(number);
        }
        if state.versions.last_sequence() < max_sequence {
            state.versions.set_last_sequence(max_sequence);
        }
        Ok(())
    }

    /// Replay one log into memtables, writing each to level 0 when it fills
    /// and once more at the end.
    fn recover_log_file(
        &self,
        state: &mut MutexGuard<'_, DbState>,
        number: u64,
        edit: &mut VersionEdit,
        max_sequence: &mut SequenceNumber,
    ) -> Result<()> {
        let path = log_file_name(&self.dbname, number);
        info!("recovering log #{}", number);
        let paranoid = self.options.paranoid_checks;
        let reader = LogReader::open(&path, paranoid)?;

        let mut mem: Option<Arc<MemTable>> = None;
        let mut records = reader.records();
        for record in records.by_ref() {
            let record = record?;
            if record.len() < BATCH_HEADER_SIZE {
                let e = Error::Corruption(format!("log #{}: record too small", number));
                if paranoid {
                    return Err(e);
                }
                warn!("{}; skipping {} bytes", e, record.len());
                continue;
            }
            let batch = WriteBatch::from_contents(&record)?;
            let table = mem.get_or_insert_with(|| Arc::new(MemTable::new(self.icmp.clone())));
            if let Err(e) = batch.insert_into(table) {
                if paranoid {
                    return Err(e);
                }
                warn!("log #{}: ignoring bad batch: {}", number, e);
                continue;
            }
            let last = batch.sequence() + u64::from(batch.count()).saturating_sub(1);
            *max_sequence = (*max_sequence).max(last);

            if table.approximate_memory_usage() > self.options.write_buffer_size {
                if let Some(full) = mem.take() {
                    self.write_level0_table(state, &full, edit, None)?;
                }
            }
        }
        if records.corruptions() > 0 {
            warn!(
                "log #{}: dropped {} bytes in {} places",
                number,
                records.dropped_bytes(),
                records.corruptions()
            );
        }

        if let Some(mem) = mem {
            self.write_level0_table(state, &mem, edit, None)?;
        }
        Ok(())
    }
}
