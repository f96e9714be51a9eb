// MemTable: versioned entries keyed by internal key, tombstones, snapshots.

use std::sync::Arc;
use std::thread;

use ravel::comparator::{BytewiseComparator, InternalKeyComparator};
use ravel::iterator::StorageIterator;
use ravel::memtable::MemTable;
use ravel::types::{Lookup, LookupKey, MAX_SEQUENCE_NUMBER, ParsedInternalKey, ValueType};

fn new_memtable() -> Arc<MemTable> {
    Arc::new(MemTable::new(InternalKeyComparator::new(Arc::new(
        BytewiseComparator,
    ))))
}

fn get(mem: &MemTable, key: &[u8], seq: u64) -> Option<Lookup> {
    mem.get(&LookupKey::new(key, seq))
}

// =============================================================================
// Test 1: Add then get
// =============================================================================
#[test]
fn add_then_get_returns_value() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"key", b"value");
    assert_eq!(
        get(&mem, b"key", MAX_SEQUENCE_NUMBER),
        Some(Lookup::Value(b"value".to_vec()))
    );
}

// =============================================================================
// Test 2: Unknown key
// =============================================================================
#[test]
fn get_nonexistent_returns_none() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"b", b"1");
    assert_eq!(get(&mem, b"a", MAX_SEQUENCE_NUMBER), None);
    assert_eq!(get(&mem, b"c", MAX_SEQUENCE_NUMBER), None);
    // A key that is a prefix of a stored key is a different key.
    assert_eq!(get(&mem, b"", MAX_SEQUENCE_NUMBER), None);
}

// =============================================================================
// Test 3: Tombstone reports Deleted, not absent
// =============================================================================
#[test]
fn delete_reports_deleted() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"key", b"value");
    mem.add(2, ValueType::Deletion, b"key", b"");
    assert_eq!(get(&mem, b"key", MAX_SEQUENCE_NUMBER), Some(Lookup::Deleted));
}

// =============================================================================
// Test 4: Put after delete returns the new value
// =============================================================================
#[test]
fn put_delete_put_returns_newest() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"key", b"first");
    mem.add(2, ValueType::Deletion, b"key", b"");
    mem.add(3, ValueType::Value, b"key", b"second");
    assert_eq!(
        get(&mem, b"key", MAX_SEQUENCE_NUMBER),
        Some(Lookup::Value(b"second".to_vec()))
    );
}

// =============================================================================
// Test 5: Lookups at older sequences see older versions
// =============================================================================
#[test]
fn lookup_respects_sequence() {
    let mem = new_memtable();
    mem.add(10, ValueType::Value, b"k", b"v10");
    mem.add(20, ValueType::Deletion, b"k", b"");
    mem.add(30, ValueType::Value, b"k", b"v30");

    assert_eq!(get(&mem, b"k", 5), None);
    assert_eq!(get(&mem, b"k", 10), Some(Lookup::Value(b"v10".to_vec())));
    assert_eq!(get(&mem, b"k", 19), Some(Lookup::Value(b"v10".to_vec())));
    assert_eq!(get(&mem, b"k", 20), Some(Lookup::Deleted));
    assert_eq!(get(&mem, b"k", 29), Some(Lookup::Deleted));
    assert_eq!(get(&mem, b"k", 30), Some(Lookup::Value(b"v30".to_vec())));
}

// =============================================================================
// Test 6: Iterator yields every version, user key ascending, newest first
// =============================================================================
#[test]
fn iterator_orders_versions_newest_first() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"b", b"b1");
    mem.add(2, ValueType::Value, b"a", b"a2");
    mem.add(3, ValueType::Value, b"b", b"b3");
    mem.add(4, ValueType::Deletion, b"a", b"");

    let mut it = mem.iter();
    let mut seen = Vec::new();
    while it.is_valid() {
        let k = ParsedInternalKey::parse(it.key()).unwrap();
        seen.push((k.user_key.to_vec(), k.sequence, k.value_type));
        it.next().unwrap();
    }
    assert_eq!(
        seen,
        vec![
            (b"a".to_vec(), 4, ValueType::Deletion),
            (b"a".to_vec(), 2, ValueType::Value),
            (b"b".to_vec(), 3, ValueType::Value),
            (b"b".to_vec(), 1, ValueType::Value),
        ]
    );
}

// =============================================================================
// Test 7: Seek by lookup key finds the visible version
// =============================================================================
#[test]
fn iterator_seek_with_lookup_key() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"k", b"old");
    mem.add(5, ValueType::Value, b"k", b"new");
    let mut it = mem.iter();
    it.seek(LookupKey::new(b"k", 3).internal_key()).unwrap();
    assert!(it.is_valid());
    assert_eq!(it.value(), b"old");
}

// =============================================================================
// Test 8: Memory usage grows
// =============================================================================
#[test]
fn memory_usage_grows() {
    let mem = new_memtable();
    assert_eq!(mem.approximate_memory_usage(), 0);
    assert!(mem.is_empty());
    mem.add(1, ValueType::Value, b"key", &[0u8; 1000]);
    assert!(mem.approximate_memory_usage() >= 1000);
    assert_eq!(mem.len(), 1);
}

// =============================================================================
// Test 9: An iterator keeps working while the writer keeps adding
// =============================================================================
#[test]
fn iterator_survives_concurrent_inserts() {
    let mem = new_memtable();
    for i in 0..100u32 {
        mem.add(u64::from(i) + 1, ValueType::Value, &i.to_be_bytes(), b"v");
    }
    let mut it = mem.iter();

    let writer_mem = Arc::clone(&mem);
    let writer = thread::spawn(move || {
        for i in 100..1100u32 {
            writer_mem.add(u64::from(i) + 1, ValueType::Value, &i.to_be_bytes(), b"v");
        }
    });

    let mut count = 0;
    let mut last: Option<Vec<u8>> = None;
    while it.is_valid() {
        let key = it.key().to_vec();
        if let Some(prev) = &last {
            assert!(prev < &key, "iterator went backwards");
        }
        last = Some(key);
        count += 1;
        it.next().unwrap();
    }
    writer.join().unwrap();
    assert!(count >= 100);
    assert_eq!(mem.len(), 1100);
}

// =============================================================================
// Test 10: Readers run alongside a writer
// =============================================================================
#[test]
fn concurrent_readers_and_writer() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"fixed", b"value");

    let writer_mem = Arc::clone(&mem);
    let writer = thread::spawn(move || {
        for i in 0..500u64 {
            let key = format!("key{}", i);
            writer_mem.add(i + 2, ValueType::Value, key.as_bytes(), b"x");
        }
    });

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let mem = Arc::clone(&mem);
            thread::spawn(move || {
                for _ in 0..500 {
                    assert_eq!(
                        get(&mem, b"fixed", MAX_SEQUENCE_NUMBER),
                        Some(Lookup::Value(b"value".to_vec()))
                    );
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(
        get(&mem, b"key499", MAX_SEQUENCE_NUMBER),
        Some(Lookup::Value(b"x".to_vec()))
    );
}
