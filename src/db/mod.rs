//! The database facade.
//!
//! One mutex guards all mutable engine state ([`DbState`]). Foreground
//! writers queue behind it and commit in groups; a single background thread
//! flushes memtables and runs compactions. Both sides drop the mutex around
//! file IO and pick it back up to install results.

mod builder;
mod compact;
mod iter;
mod recovery;
mod stats;
mod write;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

pub use iter::DbIterator;
pub use stats::{LevelStats, Stats};

use crate::batch::WriteBatch;
use crate::cache::BlockCache;
use crate::cache::table_cache::TableCache;
use crate::comparator::{Comparator, InternalKeyComparator};
use crate::compaction::CompactionStats;
use crate::error::{Error, Result};
use crate::iterator::{BoxedIterator, MergingIterator};
use crate::memtable::MemTable;
use crate::options::{Options, ReadOptions, WriteOptions};
use crate::snapshot::SnapshotList;
use crate::types::{InternalKey, Lookup, LookupKey, SequenceNumber};
use crate::version::{NUM_LEVELS, VersionSet};
use crate::wal::LogWriter;
use write::QueuedWrite;

/// Messages to the background thread.
enum Signal {
    /// Look for flush or compaction work.
    Compact,
    Shutdown,
}

/// A manual compaction of one level, advanced a step per background pass.
struct ManualCompaction {
    id: u64,
    level: usize,
    /// Where the next step starts; `None` is the beginning of the key space.
    begin: Option<InternalKey>,
    end: Option<InternalKey>,
    done: bool,
}

/// Everything the DB mutex protects.
pub(crate) struct DbState {
    mem: Arc<MemTable>,
    imm: Option<Arc<MemTable>>,
    /// Shared so the commit leader can append with the DB mutex released.
    log: Option<Arc<Mutex<LogWriter>>>,
    log_file_number: u64,
    versions: VersionSet,

    writers: VecDeque<QueuedWrite>,
    /// Results for writers committed by another leader, keyed by ticket.
    completed: HashMap<u64, Result<()>>,
    next_ticket: u64,

    snapshots: SnapshotList,
    /// Table numbers being written; not yet in any version.
    pending_outputs: HashSet<u64>,
    manual: Option<ManualCompaction>,
    next_manual_id: u64,

    bg_compaction_scheduled: bool,
    shutting_down: bool,
    bg_error: Option<Error>,
    /// Set when `bg_error` came from background work, which may clear it
    /// by succeeding later. Log write failures stay.
    bg_error_retryable: bool,
    compaction_stats: [CompactionStats; NUM_LEVELS],
}

pub(crate) struct DbInner {
    dbname: PathBuf,
    options: Options,
    icmp: InternalKeyComparator,
    table_cache: Arc<TableCache>,
    state: Mutex<DbState>,
    /// Wakes queued writers when the head of the queue changes.
    write_cv: Condvar,
    /// Signalled whenever a background pass finishes.
    bg_cv: Condvar,
    /// Lets a running compaction notice a full memtable without the mutex.
    has_imm: AtomicBool,
    bg_sender: Sender<Signal>,
}

/// An embedded, ordered key-value store.
///
/// ```no_run
/// use ravel::{DB, Options};
///
/// let db = DB::open("/tmp/ravel-demo", Options::default()).unwrap();
/// db.put(b"key", b"value").unwrap();
/// assert_eq!(db.get(b"key").unwrap(), Some(b"value".to_vec()));
/// ```
pub struct DB {
    inner: Arc<DbInner>,
    worker: Option<JoinHandle<()>>,
}

/// A consistent read view. Reads through [`Snapshot::read_options`] see the
/// database as it was when the snapshot was taken. Released on drop.
pub struct Snapshot<'a> {
    db: &'a DB,
    sequence: SequenceNumber,
}

impl Snapshot<'_> {
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            snapshot: Some(self.sequence),
            ..ReadOptions::default()
        }
    }
}

impl Drop for Snapshot<'_> {
    fn drop(&mut self) {
        self.db.inner.state.lock().snapshots.release(self.sequence);
    }
}

impl DB {
    /// Open the database at `path`, recovering whatever a previous process
    /// left there.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<DB> {
        let dbname = path.as_ref().to_path_buf();
        let options = options.sanitize();
        info!("opening database at {} with {:?}", dbname.display(), options);

        let block_cache = Arc::new(BlockCache::new(options.block_cache_capacity));
        let table_cache = Arc::new(TableCache::new(
            dbname.clone(),
            options.clone(),
            Some(block_cache),
        ));
        let icmp = InternalKeyComparator::new(Arc::clone(&options.comparator));
        let versions = VersionSet::new(&dbname, &options, Arc::clone(&table_cache));
        let (bg_sender, bg_receiver) = crossbeam_channel::unbounded();

        let inner = Arc::new(DbInner {
            dbname,
            icmp: icmp.clone(),
            table_cache,
            state: Mutex::new(DbState {
                mem: Arc::new(MemTable::new(icmp)),
                imm: None,
                log: None,
                log_file_number: 0,
                versions,
                writers: VecDeque::new(),
                completed: HashMap::new(),
                next_ticket: 0,
                snapshots: SnapshotList::new(),
                pending_outputs: HashSet::new(),
                manual: None,
                next_manual_id: 0,
                bg_compaction_scheduled: false,
                shutting_down: false,
                bg_error: None,
                bg_error_retryable: false,
                compaction_stats: Default::default(),
            }),
            options,
            write_cv: Condvar::new(),
            bg_cv: Condvar::new(),
            has_imm: AtomicBool::new(false),
            bg_sender,
        });

        inner.open_state()?;

        let worker_inner = Arc::clone(&inner);
        let worker = std::thread::Builder::new()
            .name("ravel-compaction".into())
            .spawn(move || background_worker(worker_inner, bg_receiver))?;

        Ok(DB {
            inner,
            worker: Some(worker),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.dbname
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(&WriteOptions::default(), batch)
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(&WriteOptions::default(), batch)
    }

    /// Apply `batch` atomically. With `options.sync` the log is fsync'd
    /// before this returns.
    pub fn write(&self, options: &WriteOptions, batch: WriteBatch) -> Result<()> {
        self.inner.write(options, Some(batch))
    }

    /// Latest value of `key`, or `None` if absent or deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_with(&ReadOptions::default(), key)
    }

    pub fn get_with(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(options, key)
    }

    /// Forward iterator over live user keys, in comparator order.
    pub fn iter(&self, options: &ReadOptions) -> Result<DbIterator> {
        self.inner.new_iterator(options)
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        let mut state = self.inner.state.lock();
        let sequence = state.versions.last_sequence();
        state.snapshots.acquire(sequence);
        Snapshot { db: self, sequence }
    }

    /// Compact every file overlapping the user key range [begin, end] down
    /// to the deepest level that holds data in that range. `None` bounds are
    /// open. Blocks until done.
    pub fn compact_range(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> Result<()> {
        let max_level_with_files = {
            let state = self.inner.state.lock();
            let current = state.versions.current();
            (1..NUM_LEVELS)
                .filter(|&level| current.overlap_in_level(level, begin, end))
                .max()
                .unwrap_or(1)
        };
        self.compact_memtable()?;
        for level in 0..max_level_with_files {
            self.inner.manual_compaction(level, begin, end)?;
        }
        Ok(())
    }

    /// Flush the active memtable to a table and wait for it to land.
    pub fn compact_memtable(&self) -> Result<()> {
        self.inner.write(&WriteOptions::default(), None)?;
        let mut state = self.inner.state.lock();
        while state.imm.is_some() && state.bg_error.is_none() {
            self.inner.bg_cv.wait(&mut state);
        }
        match &state.bg_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn num_level_files(&self, level: usize) -> usize {
        self.inner.state.lock().versions.num_level_files(level)
    }

    pub fn stats(&self) -> Stats {
        let state = self.inner.state.lock();
        let current = state.versions.current();
        let levels = (0..NUM_LEVELS)
            .map(|level| LevelStats {
                files: current.num_files(level),
                bytes: current.level_bytes(level),
                compaction: state.compaction_stats[level],
            })
            .collect();
        Stats {
            levels,
            last_sequence: state.versions.last_sequence(),
            memtable_bytes: state.mem.approximate_memory_usage(),
            immutable_memtable: state.imm.is_some(),
            live_versions: state.versions.live_versions(),
            snapshots: state.snapshots.len(),
            open_tables: self.inner.table_cache.len(),
        }
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.shutting_down = true;
        }
        let _ = self.inner.bg_sender.send(Signal::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("background thread panicked");
            }
        }
        let state = self.inner.state.lock();
        if let Some(log) = &state.log {
            if let Err(e) = log.lock().flush() {
                warn!("flushing log on close: {}", e);
            }
        }
        info!("closed database at {}", self.inner.dbname.display());
    }
}

fn background_worker(inner: Arc<DbInner>, signals: Receiver<Signal>) {
    while let Ok(signal) = signals.recv() {
        match signal {
            Signal::Compact => inner.background_call(),
            Signal::Shutdown => break,
        }
    }
    debug!("background thread exiting");
}

impl DbInner {
    fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (mem, imm, current, sequence) = {
            let state = self.state.lock();
            let sequence = options
                .snapshot
                .unwrap_or_else(|| state.versions.last_sequence());
            (
                Arc::clone(&state.mem),
                state.imm.clone(),
                state.versions.current(),
                sequence,
            )
        };

        let lkey = LookupKey::new(key, sequence);
        let found = match mem.get(&lkey) {
            Some(found) => Some(found),
            None => imm.as_ref().and_then(|imm| imm.get(&lkey)),
        };
        let found = match found {
            Some(found) => Some(found),
            None => {
                let (found, stats) = current.get(options, &lkey, &self.table_cache)?;
                if current.update_stats(&stats) {
                    let mut state = self.state.lock();
                    self.maybe_schedule_compaction(&mut state);
                }
                found
            }
        };
        Ok(match found {
            Some(Lookup::Value(value)) => Some(value),
            Some(Lookup::Deleted) | None => None,
        })
    }

    fn new_iterator(&self, options: &ReadOptions) -> Result<DbIterator> {
        let (mem, imm, current, sequence) = {
            let state = self.state.lock();
            let sequence = options
                .snapshot
                .unwrap_or_else(|| state.versions.last_sequence());
            (
                Arc::clone(&state.mem),
                state.imm.clone(),
                state.versions.current(),
                sequence,
            )
        };

        let mut children: Vec<BoxedIterator> = vec![Box::new(mem.iter())];
        if let Some(imm) = &imm {
            children.push(Box::new(imm.iter()));
        }
        current.add_iterators(options, &self.table_cache, &mut children)?;
        let cmp: Arc<dyn Comparator> = Arc::new(self.icmp.clone());
        let merged = MergingIterator::new(cmp, children);
        DbIterator::new(
            merged,
            Arc::clone(self.icmp.user_comparator()),
            sequence,
            current,
        )
    }

    /// Queue a background pass if there is work and none is queued.
    fn maybe_schedule_compaction(&self, state: &mut MutexGuard<'_, DbState>) {
        if state.bg_compaction_scheduled || state.shutting_down {
            return;
        }
        if state.bg_error.is_some() && !state.bg_error_retryable {
            return;
        }
        let manual_pending = state.manual.as_ref().is_some_and(|m| !m.done);
        if state.imm.is_none() && !manual_pending && !state.versions.needs_compaction() {
            return;
        }
        state.bg_compaction_scheduled = true;
        if self.bg_sender.send(Signal::Compact).is_err() {
            state.bg_compaction_scheduled = false;
        }
    }

    fn shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    fn set_has_imm(&self, value: bool) {
        self.has_imm.store(value, Ordering::Release);
    }
}
