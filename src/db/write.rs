use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use log::{debug, error, info};
use parking_lot::{Mutex, MutexGuard};

use crate::batch::WriteBatch;
use crate::db::{DbInner, DbState};
use crate::error::{Error, Result};
use crate::filename::log_file_name;
use crate::memtable::MemTable;
use crate::options::WriteOptions;
use crate::wal::LogWriter;

/// Upper bound on a commit group.
const MAX_GROUP_BYTES: usize = 1 << 20;

/// A leader whose own batch is at most this size only lets the group grow
/// by this much, so a small write is not held back behind a large group.
const SMALL_BATCH_BYTES: usize = 128 << 10;

/// A writer waiting in the commit queue. `batch` is `None` for a request to
/// force the memtable out.
pub(crate) struct QueuedWrite {
    pub(crate) ticket: u64,
    pub(crate) batch: Option<WriteBatch>,
    pub(crate) sync: bool,
}

/// Merge the batches at the head of the queue into one, starting with the
/// leader at the front. Returns the merged batch and how many queue entries
/// it covers.
///
/// The group stops at a writer asking for a sync the leader won't do, at a
/// memtable-forcing request, or where it would exceed its byte budget.
pub(crate) fn build_batch_group(writers: &mut VecDeque<QueuedWrite>) -> (WriteBatch, usize) {
    let leader = &mut writers[0];
    let leader_sync = leader.sync;
    let mut result = leader.batch.take().unwrap_or_default();

    let mut size = result.approximate_size();
    let max_size = if size <= SMALL_BATCH_BYTES {
        size + SMALL_BATCH_BYTES
    } else {
        MAX_GROUP_BYTES
    };

    let mut grouped = 1;
    for w in writers.iter_mut().skip(1) {
        if w.sync && !leader_sync {
            break;
        }
        let Some(batch) = w.batch.as_ref() else {
            break;
        };
        size += batch.approximate_size();
        if size > max_size {
            break;
        }
        result.append(batch);
        w.batch = None;
        grouped += 1;
    }
    (result, grouped)
}

impl DbInner {
    /// Queue a write and wait until a leader (possibly this thread) has
    /// committed it.
    pub(crate) fn write(&self, options: &WriteOptions, batch: Option<WriteBatch>) -> Result<()> {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.writers.push_back(QueuedWrite {
            ticket,
            batch,
            sync: options.sync,
        });

        loop {
            if let Some(result) = state.completed.remove(&ticket) {
                return result;
            }
            if state.writers.front().is_some_and(|w| w.ticket == ticket) {
                break;
            }
            self.write_cv.wait(&mut state);
        }

        // This thread leads the next group.
        let force = state.writers[0].batch.is_none();
        let mut result = self.make_room_for_write(&mut state, force);
        let mut grouped = 1;

        if result.is_ok() && !force {
            let (mut batch, n) = build_batch_group(&mut state.writers);
            grouped = n;
            let sync = state.writers[0].sync;
            let last_sequence = state.versions.last_sequence();
            batch.set_sequence(last_sequence + 1);
            let new_last_sequence = last_sequence + u64::from(batch.count());

            let mem = Arc::clone(&state.mem);
            result = match state.log.clone() {
                Some(log) => MutexGuard::unlocked(&mut state, || {
                    commit_group(&log, &mem, &batch, sync)
                }),
                None => Err(Error::InvalidArgument("database has no open log".into())),
            };

            match &result {
                Ok(()) => state.versions.set_last_sequence(new_last_sequence),
                Err(e) => {
                    // The log may now hold a partial record; no further
                    // writes until reopen.
                    error!("write group of {} failed: {}", grouped, e);
                    if state.bg_error.is_none() {
                        state.bg_error = Some(e.clone());
                        state.bg_error_retryable = false;
                    }
                }
            }
        }

        for _ in 0..grouped {
            if let Some(w) = state.writers.pop_front() {
                if w.ticket != ticket {
                    state.completed.insert(w.ticket, result.clone());
                }
            }
        }
        self.write_cv.notify_all();
        result
    }

    /// Make sure the active memtable can take a write, switching to a fresh
    /// memtable and log when it is full. May release the mutex to wait for
    /// the background thread.
    ///
    /// With `force` the current memtable is switched out even when it has
    /// room.
    pub(crate) fn make_room_for_write(
        &self,
        state: &mut MutexGuard<'_, DbState>,
        mut force: bool,
    ) -> Result<()> {
        let mut allow_delay = !force;
        loop {
            if let Some(e) = &state.bg_error {
                return Err(e.clone());
            } else if allow_delay
                && state.versions.num_level_files(0) >= self.options.l0_slowdown_writes_trigger
            {
                // Give the compaction thread some room rather than stalling
                // one writer for a long time at the stop trigger.
                debug!("too many level-0 files; delaying write");
                let delay = self.options.slowdown_delay;
                MutexGuard::unlocked(state, || thread::sleep(delay));
                allow_delay = false;
            } else if !force
                && state.mem.approximate_memory_usage() <= self.options.write_buffer_size
            {
                return Ok(());
            } else if state.imm.is_some() {
                info!("current memtable full; waiting for the previous one to flush");
                self.bg_cv.wait(state);
            } else if state.versions.num_level_files(0) >= self.options.l0_stop_writes_trigger {
                info!("too many level-0 files; waiting for compaction");
                self.bg_cv.wait(state);
            } else {
                let number = state.versions.new_file_number();
                let log = match LogWriter::create(
                    &log_file_name(&self.dbname, number),
                    self.options.sync_policy,
                ) {
                    Ok(log) => log,
                    Err(e) => {
                        state.versions.reuse_file_number(number);
                        return Err(e);
                    }
                };
                if let Some(old) = state.log.replace(Arc::new(Mutex::new(log))) {
                    if let Err(e) = old.lock().flush() {
                        error!("flushing log #{}: {}", state.log_file_number, e);
                    }
                }
                state.log_file_number = number;

                let fresh = Arc::new(MemTable::new(self.icmp.clone()));
                let full = std::mem::replace(&mut state.mem, fresh);
                state.imm = Some(full);
                self.set_has_imm(true);
                debug!("switched to log #{}", number);
                force = false;
                self.maybe_schedule_compaction(state);
            }
        }
    }
}

/// Log the group then apply it to the memtable. Runs without the DB mutex;
/// only the leader touches the log and the active memtable.
fn commit_group(log: &Mutex<LogWriter>, mem: &MemTable, batch: &WriteBatch, sync: bool) -> Result<()> {
    {
        let mut log = log.lock();
        log.add_record(batch.contents())?;
        if sync {
            log.sync()?;
        }
    }
    batch.insert_into(mem)
}
