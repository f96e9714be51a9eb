// The DB facade: reads and writes, recovery, snapshots, iteration and
// compaction, end to end on a real directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use ravel::filename::table_file_name;
use ravel::wal::LogReader;
use ravel::{
    BloomFilterPolicy, DB, Error, FilterPolicy, Options, ReadOptions, StorageIterator, WriteBatch,
    WriteOptions,
};

fn options() -> Options {
    let _ = env_logger::builder().is_test(true).try_init();
    Options {
        create_if_missing: true,
        ..Options::default()
    }
}

/// Small buffers so a few thousand writes exercise flushes and compactions.
fn small_options() -> Options {
    Options {
        write_buffer_size: 32 * 1024,
        max_file_size: 64 * 1024,
        level1_max_bytes: 128 * 1024,
        block_size: 1024,
        ..options()
    }
}

fn key(i: usize) -> Vec<u8> {
    format!("key{:06}", i).into_bytes()
}

fn value(i: usize, round: usize) -> Vec<u8> {
    let mut v = format!("value-{}-{}-", i, round).into_bytes();
    v.resize(100, b'x');
    v
}

fn scan(db: &DB, options: &ReadOptions) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut it = db.iter(options).unwrap();
    let mut out = Vec::new();
    while it.is_valid() {
        out.push((it.key().to_vec(), it.value().to_vec()));
        it.next().unwrap();
    }
    out
}

fn log_files(dir: &Path) -> Vec<PathBuf> {
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "log"))
        .collect();
    logs.sort();
    logs
}

// =============================================================================
// Test 1: Put, overwrite, delete
// =============================================================================
#[test]
fn put_get_delete() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), options()).unwrap();

    assert_eq!(db.get(b"foo").unwrap(), None);
    db.put(b"foo", b"v1").unwrap();
    assert_eq!(db.get(b"foo").unwrap(), Some(b"v1".to_vec()));
    db.put(b"foo", b"v2").unwrap();
    assert_eq!(db.get(b"foo").unwrap(), Some(b"v2".to_vec()));
    db.delete(b"foo").unwrap();
    assert_eq!(db.get(b"foo").unwrap(), None);

    // Deleting a missing key is not an error.
    db.delete(b"never-there").unwrap();
    db.put(b"", b"empty key").unwrap();
    assert_eq!(db.get(b"").unwrap(), Some(b"empty key".to_vec()));
}

// =============================================================================
// Test 2: create_if_missing and error_if_exists
// =============================================================================
#[test]
fn open_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");

    let err = DB::open(&path, Options::default()).err().unwrap();
    assert!(matches!(err, Error::InvalidArgument(_)));

    drop(DB::open(&path, options()).unwrap());

    let err = DB::open(
        &path,
        Options {
            error_if_exists: true,
            ..options()
        },
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::InvalidArgument(_)));

    // Existing database opens without create_if_missing.
    drop(DB::open(&path, Options::default()).unwrap());
}

// =============================================================================
// Test 3: Writes still in the log come back after reopen
// =============================================================================
#[test]
fn reopen_replays_log() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = DB::open(dir.path(), options()).unwrap();
        db.put(b"a", b"1").unwrap();
        db.put(b"b", b"2").unwrap();
        db.delete(b"a").unwrap();
        db.put(b"c", b"3").unwrap();
    }
    let db = DB::open(dir.path(), options()).unwrap();
    assert_eq!(db.get(b"a").unwrap(), None);
    assert_eq!(db.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.get(b"c").unwrap(), Some(b"3".to_vec()));
    assert_eq!(db.stats().last_sequence, 4);

    // New writes continue the sequence.
    db.put(b"d", b"4").unwrap();
    assert_eq!(db.stats().last_sequence, 5);

    // Replayed logs became a table; only the fresh log is left.
    assert_eq!(log_files(dir.path()).len(), 1);
    assert_eq!(db.stats().total_files(), 1);
}

// =============================================================================
// Test 4: Flushed data is served from tables, before and after reopen
// =============================================================================
#[test]
fn flush_to_table_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = DB::open(dir.path(), options()).unwrap();
        for i in 0..100 {
            db.put(&key(i), &value(i, 0)).unwrap();
        }
        db.compact_memtable().unwrap();
        assert_eq!(db.stats().total_files(), 1);
        assert!(!db.stats().immutable_memtable);
        for i in 0..100 {
            assert_eq!(db.get(&key(i)).unwrap(), Some(value(i, 0)));
        }
    }
    let db = DB::open(dir.path(), options()).unwrap();
    for i in 0..100 {
        assert_eq!(db.get(&key(i)).unwrap(), Some(value(i, 0)));
    }
    assert_eq!(db.get(&key(100)).unwrap(), None);
}

// =============================================================================
// Test 5: A batch applies all its operations under consecutive sequences
// =============================================================================
#[test]
fn write_batch_is_atomic() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), options()).unwrap();
    db.put(b"gone", b"x").unwrap();

    let mut batch = WriteBatch::new();
    batch.put(b"k1", b"v1");
    batch.delete(b"gone");
    batch.put(b"k2", b"v2");
    batch.put(b"k1", b"v1-final");
    db.write(&WriteOptions { sync: true }, batch).unwrap();

    assert_eq!(db.stats().last_sequence, 5);
    assert_eq!(db.get(b"k1").unwrap(), Some(b"v1-final".to_vec()));
    assert_eq!(db.get(b"k2").unwrap(), Some(b"v2".to_vec()));
    assert_eq!(db.get(b"gone").unwrap(), None);

    db.write(&WriteOptions::default(), WriteBatch::new()).unwrap();
    assert_eq!(db.stats().last_sequence, 5);
}

// =============================================================================
// Test 6: Snapshots pin what a read sees
// =============================================================================
#[test]
fn snapshot_reads() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), options()).unwrap();
    db.put(b"k", b"v1").unwrap();
    db.put(b"other", b"o1").unwrap();

    let snap = db.snapshot();
    assert_eq!(snap.sequence(), 2);
    db.put(b"k", b"v2").unwrap();
    db.delete(b"other").unwrap();
    db.put(b"new", b"n").unwrap();

    // The snapshot survives a flush.
    db.compact_memtable().unwrap();

    let at_snap = snap.read_options();
    assert_eq!(db.get_with(&at_snap, b"k").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(db.get_with(&at_snap, b"other").unwrap(), Some(b"o1".to_vec()));
    assert_eq!(db.get_with(&at_snap, b"new").unwrap(), None);
    assert_eq!(db.get(b"k").unwrap(), Some(b"v2".to_vec()));
    assert_eq!(db.get(b"other").unwrap(), None);

    let keys: Vec<Vec<u8>> = scan(&db, &at_snap).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![b"k".to_vec(), b"other".to_vec()]);

    assert_eq!(db.stats().snapshots, 1);
    drop(snap);
    assert_eq!(db.stats().snapshots, 0);
}

// =============================================================================
// Test 7: Iteration merges memtable and tables, newest version only
// =============================================================================
#[test]
fn iterator_hides_old_versions_and_tombstones() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), options()).unwrap();
    for k in ["a", "b", "c", "d", "e"] {
        db.put(k.as_bytes(), b"old").unwrap();
    }
    db.compact_memtable().unwrap();
    db.put(b"b", b"new").unwrap();
    db.delete(b"c").unwrap();
    db.put(b"f", b"new").unwrap();

    let got = scan(&db, &ReadOptions::default());
    let expected: Vec<(Vec<u8>, Vec<u8>)> = [
        ("a", "old"),
        ("b", "new"),
        ("d", "old"),
        ("e", "old"),
        ("f", "new"),
    ]
    .iter()
    .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
    .collect();
    assert_eq!(got, expected);

    let mut it = db.iter(&ReadOptions::default()).unwrap();
    it.seek(b"c").unwrap();
    assert_eq!(it.key(), b"d");
    it.seek(b"bb").unwrap();
    assert_eq!(it.key(), b"d");
    it.seek(b"b").unwrap();
    assert_eq!((it.key(), it.value()), (&b"b"[..], &b"new"[..]));
    it.seek(b"g").unwrap();
    assert!(!it.is_valid());
}

// =============================================================================
// Test 8: An open iterator does not see later writes
// =============================================================================
#[test]
fn iterator_is_a_point_in_time_view() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), options()).unwrap();
    db.put(b"a", b"1").unwrap();
    db.put(b"c", b"3").unwrap();

    let mut it = db.iter(&ReadOptions::default()).unwrap();
    db.put(b"b", b"2").unwrap();
    db.delete(b"c").unwrap();

    let mut keys = Vec::new();
    while it.is_valid() {
        keys.push(it.key().to_vec());
        it.next().unwrap();
    }
    assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
}

// =============================================================================
// Test 9: Enough writes to flush and compact repeatedly, then reopen
// =============================================================================
#[test]
fn many_writes_survive_flushes_and_compactions() {
    let dir = tempfile::tempdir().unwrap();
    let n = 4000;
    {
        let db = DB::open(dir.path(), small_options()).unwrap();
        for round in 0..2 {
            for i in 0..n {
                db.put(&key(i), &value(i, round)).unwrap();
            }
        }
        for i in (0..n).step_by(3) {
            db.delete(&key(i)).unwrap();
        }
        let stats = db.stats();
        assert!(stats.total_files() > 1, "{}", stats);
        for i in 0..n {
            let expected = if i % 3 == 0 { None } else { Some(value(i, 1)) };
            assert_eq!(db.get(&key(i)).unwrap(), expected, "key {}", i);
        }
    }

    let db = DB::open(dir.path(), small_options()).unwrap();
    assert_eq!(db.stats().last_sequence, (2 * n + n.div_ceil(3)) as u64);
    let got = scan(&db, &ReadOptions::default());
    assert_eq!(got.len(), n - n.div_ceil(3));
    for (k, v) in &got {
        let i: usize = std::str::from_utf8(&k[3..]).unwrap().parse().unwrap();
        assert_ne!(i % 3, 0);
        assert_eq!(v, &value(i, 1));
    }
}

// =============================================================================
// Test 10: compact_range empties level 0 and drops deleted data
// =============================================================================
#[test]
fn compact_range_pushes_data_down() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), small_options()).unwrap();
    for i in 0..2000 {
        db.put(&key(i), &value(i, 0)).unwrap();
    }
    db.compact_range(None, None).unwrap();
    assert_eq!(db.num_level_files(0), 0);
    let before = db.stats().total_bytes();
    assert!(before > 0);

    for i in 0..1000 {
        db.delete(&key(i)).unwrap();
    }
    db.compact_range(None, None).unwrap();
    assert_eq!(db.num_level_files(0), 0);
    assert!(db.stats().total_bytes() < before);

    assert_eq!(db.get(&key(10)).unwrap(), None);
    assert_eq!(db.get(&key(1500)).unwrap(), Some(value(1500, 0)));
    assert_eq!(scan(&db, &ReadOptions::default()).len(), 1000);
}

// =============================================================================
// Test 11: Deleting everything and compacting leaves no tables behind
// =============================================================================
#[test]
fn tombstones_are_dropped_at_the_bottom() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), options()).unwrap();
    for i in 0..200 {
        db.put(&key(i), &value(i, 0)).unwrap();
    }
    db.compact_range(None, None).unwrap();
    assert!(db.stats().total_files() > 0);

    for i in 0..200 {
        db.delete(&key(i)).unwrap();
    }
    db.compact_range(None, None).unwrap();
    assert_eq!(db.stats().total_files(), 0);
    assert!(scan(&db, &ReadOptions::default()).is_empty());
}

// =============================================================================
// Test 12: Concurrent writers: every write lands, sequences are dense
// =============================================================================
#[test]
fn concurrent_writers() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), small_options()).unwrap();
    let threads = 8;
    let per_thread = 500;

    thread::scope(|s| {
        for t in 0..threads {
            let db = &db;
            s.spawn(move || {
                for i in 0..per_thread {
                    let k = format!("t{}-{:04}", t, i);
                    db.put(k.as_bytes(), k.as_bytes()).unwrap();
                }
            });
        }
    });

    assert_eq!(db.stats().last_sequence, (threads * per_thread) as u64);
    for t in 0..threads {
        for i in 0..per_thread {
            let k = format!("t{}-{:04}", t, i);
            assert_eq!(db.get(k.as_bytes()).unwrap(), Some(k.clone().into_bytes()));
        }
    }
}

// =============================================================================
// Test 13: Readers run alongside a writer
// =============================================================================
#[test]
fn reads_during_writes() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), small_options()).unwrap();
    for i in 0..500 {
        db.put(&key(i), &value(i, 0)).unwrap();
    }

    thread::scope(|s| {
        let db = &db;
        s.spawn(move || {
            for i in 500..3000 {
                db.put(&key(i), &value(i, 0)).unwrap();
            }
        });
        for _ in 0..2 {
            s.spawn(move || {
                for round in 0..5 {
                    for i in (round..500).step_by(7) {
                        assert_eq!(db.get(&key(i)).unwrap(), Some(value(i, 0)));
                    }
                }
            });
        }
    });
}

// =============================================================================
// Test 14: Damaged log: skipped normally, fatal with paranoid checks
// =============================================================================
#[test]
fn corrupted_log_recovery() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = DB::open(dir.path(), options()).unwrap();
        db.put(b"k1", b"v1").unwrap();
        db.put(b"k2", b"v2").unwrap();
        db.put(b"k3", b"v3").unwrap();
    }
    let logs = log_files(dir.path());
    assert_eq!(logs.len(), 1);
    let mut data = fs::read(&logs[0]).unwrap();
    // Header (7) + batch header (12) + "k1"/"v1" entry (7) is one record;
    // flip a byte inside the second.
    data[26 + 7 + 14] ^= 0xff;
    fs::write(&logs[0], &data).unwrap();

    let paranoid = Options {
        paranoid_checks: true,
        ..options()
    };
    let err = DB::open(dir.path(), paranoid).err().unwrap();
    assert!(err.is_corruption());

    let db = DB::open(dir.path(), options()).unwrap();
    assert_eq!(db.get(b"k1").unwrap(), Some(b"v1".to_vec()));
    // The rest of the damaged block is gone.
    assert_eq!(db.get(b"k2").unwrap(), None);
    assert_eq!(db.get(b"k3").unwrap(), None);
}

// =============================================================================
// Test 15: Options loaded from TOML drive the engine
// =============================================================================
#[test]
fn options_from_toml() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("ravel.toml");
    fs::write(
        &config,
        r#"
        create_if_missing = true
        write_buffer_size = 16384
        bloom_bits_per_key = 0
        sync_policy = "every_write"
        "#,
    )
    .unwrap();
    let opts = Options::from_toml_file(&config).unwrap();
    assert_eq!(opts.write_buffer_size, 16384);

    let db = DB::open(dir.path().join("db"), opts).unwrap();
    for i in 0..500 {
        db.put(&key(i), &value(i, 0)).unwrap();
    }
    db.compact_memtable().unwrap();
    assert!(db.stats().total_files() > 1);
    assert_eq!(db.get(&key(250)).unwrap(), Some(value(250, 0)));
}

// =============================================================================
// Test 16: Stats report per-level layout and compaction work
// =============================================================================
#[test]
fn stats_report() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), small_options()).unwrap();
    let empty = db.stats();
    assert_eq!(empty.total_files(), 0);
    assert_eq!(empty.levels.len(), 7);

    for i in 0..2000 {
        db.put(&key(i), &value(i, 0)).unwrap();
    }
    db.compact_range(None, None).unwrap();

    let stats = db.stats();
    assert_eq!(stats.last_sequence, 2000);
    assert!(stats.total_files() > 0);
    assert!(stats.live_versions >= 1);
    let written: u64 = stats.levels.iter().map(|l| l.compaction.bytes_written).sum();
    assert!(written > 0);

    let report = stats.to_string();
    assert!(report.contains("Level  Files"));
    assert!(report.contains("last_sequence=2000"));
}

// =============================================================================
// Test 17: A failed flush is reported to writers until a retry succeeds
// =============================================================================
#[test]
fn background_error_surfaces_and_clears() {
    let dir = tempfile::tempdir().unwrap();
    let opts = Options {
        background_error_backoff: Duration::from_millis(50),
        ..options()
    };
    let db = DB::open(dir.path(), opts).unwrap();
    db.put(b"before", b"1").unwrap();

    // Directories squatting on every table name make each flush fail.
    let squatters: Vec<PathBuf> = (1..=500).map(|n| table_file_name(dir.path(), n)).collect();
    for path in &squatters {
        fs::create_dir(path).unwrap();
    }

    let err = db.compact_memtable().unwrap_err();
    assert!(matches!(err, Error::Io(_)), "unexpected error: {}", err);

    // Writers fail fast with the stored error; reads keep working.
    let err = db.put(b"during", b"2").unwrap_err();
    assert!(matches!(err, Error::Io(_)), "unexpected error: {}", err);
    assert_eq!(db.get(b"before").unwrap(), Some(b"1".to_vec()));

    for path in &squatters {
        fs::remove_dir(path).unwrap();
    }

    // After the backoff the flush is retried, succeeds and clears the error.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match db.put(b"after", b"3") {
            Ok(()) => break,
            Err(e) => {
                assert!(Instant::now() < deadline, "error never cleared: {}", e);
                thread::sleep(Duration::from_millis(20));
            }
        }
    }
    db.compact_memtable().unwrap();
    assert!(db.stats().total_files() >= 1);
    assert_eq!(db.get(b"before").unwrap(), Some(b"1".to_vec()));
    assert_eq!(db.get(b"during").unwrap(), None);
    assert_eq!(db.get(b"after").unwrap(), Some(b"3".to_vec()));

    drop(db);
    let db = DB::open(dir.path(), options()).unwrap();
    assert_eq!(db.get(b"before").unwrap(), Some(b"1".to_vec()));
    assert_eq!(db.get(b"after").unwrap(), Some(b"3".to_vec()));
}

/// Bloom filter that lets a fixed number of tables through, then holds the
/// thread building the next one until released.
struct GatedFilter {
    inner: BloomFilterPolicy,
    permits: Mutex<usize>,
    released: Condvar,
}

impl GatedFilter {
    fn new(permits: usize) -> Self {
        GatedFilter {
            inner: BloomFilterPolicy::new(10),
            permits: Mutex::new(permits),
            released: Condvar::new(),
        }
    }

    fn open(&self) {
        *self.permits.lock() = usize::MAX;
        self.released.notify_all();
    }
}

impl FilterPolicy for GatedFilter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.released.wait(&mut permits);
        }
        *permits -= 1;
        drop(permits);
        self.inner.create_filter(keys)
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        self.inner.key_may_match(key, filter)
    }
}

// =============================================================================
// Test 18: Level-0 slowdown delays writes, the stop trigger blocks them
// =============================================================================
#[test]
fn level0_triggers_throttle_writers() {
    let dir = tempfile::tempdir().unwrap();
    // Two flushes go through; the compaction they trigger is held.
    let gate = Arc::new(GatedFilter::new(2));
    let opts = Options {
        write_buffer_size: 1024,
        max_mem_compact_level: 0,
        l0_compaction_trigger: 2,
        l0_slowdown_writes_trigger: 2,
        l0_stop_writes_trigger: 2,
        slowdown_delay: Duration::from_millis(100),
        filter_policy: Some(gate.clone() as Arc<dyn FilterPolicy>),
        ..options()
    };
    let db = DB::open(dir.path(), opts).unwrap();

    // Overlapping tables, so the level-0 compaction has to merge them.
    db.put(b"a", b"0").unwrap();
    db.put(b"z", b"0").unwrap();
    db.compact_memtable().unwrap();
    db.put(b"a", b"1").unwrap();
    db.put(b"b", b"2").unwrap();
    db.put(b"z", b"26").unwrap();
    db.compact_memtable().unwrap();
    assert_eq!(db.num_level_files(0), 2);

    // Memtable has room: the write only pays the slowdown delay.
    let start = Instant::now();
    db.put(b"c", &[b'v'; 2048]).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));

    // Memtable full and level 0 at the stop trigger: the writer waits for
    // the compaction.
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    thread::scope(|s| {
        s.spawn(|| {
            done_tx.send(db.put(b"d", b"4")).unwrap();
        });

        let early = done_rx.recv_timeout(Duration::from_millis(300));
        let level0 = db.num_level_files(0);
        gate.open();
        assert!(early.is_err(), "write went through at the stop trigger");
        assert_eq!(level0, 2);

        let result = done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        result.unwrap();
    });

    assert!(db.num_level_files(0) < 2);
    for (k, v) in [("a", "1"), ("b", "2"), ("d", "4"), ("z", "26")] {
        assert_eq!(db.get(k.as_bytes()).unwrap(), Some(v.as_bytes().to_vec()));
    }
    assert_eq!(db.get(b"c").unwrap(), Some(vec![b'v'; 2048]));
}

// =============================================================================
// Test 19: Concurrent writers share log records with contiguous sequences
// =============================================================================
#[test]
fn group_commit_log_records() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;

    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), options()).unwrap();
    thread::scope(|s| {
        for t in 0..THREADS {
            let db = &db;
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let k = format!("t{}-{:04}", t, i);
                    db.put(k.as_bytes(), b"v").unwrap();
                }
            });
        }
    });
    assert_eq!(db.stats().last_sequence, (THREADS * PER_THREAD) as u64);
    drop(db);

    // Nothing was flushed, so one log holds every write.
    let logs = log_files(dir.path());
    assert_eq!(logs.len(), 1);
    let reader = LogReader::open(&logs[0], true).unwrap();
    let mut batches: Vec<WriteBatch> = reader
        .records()
        .map(|r| WriteBatch::from_contents(&r.unwrap()).unwrap())
        .collect();
    batches.sort_by_key(|b| b.sequence());

    let mut next = 1;
    let mut ops = 0;
    for batch in &batches {
        assert_eq!(batch.sequence(), next, "gap before record at {}", batch.sequence());
        let mut in_batch = 0;
        batch
            .for_each(|_, _, _| {
                in_batch += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(in_batch, batch.count());
        next += u64::from(batch.count());
        ops += batch.count() as usize;
    }
    assert_eq!(ops, THREADS * PER_THREAD);
    assert!(batches.len() <= THREADS * PER_THREAD);
    println!("{} writes in {} log records", ops, batches.len());
}
