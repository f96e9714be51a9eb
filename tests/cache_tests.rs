// Block and table caches.

use std::sync::Arc;

use ravel::cache::{LruCache, TableCache};
use ravel::filename::table_file_name;
use ravel::iterator::StorageIterator;
use ravel::options::{Options, ReadOptions};
use ravel::sstable::TableBuilder;
use ravel::types::{InternalKey, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK, ValueType};

fn write_table(dir: &std::path::Path, number: u64, options: &Options) -> u64 {
    let mut builder = TableBuilder::new(&table_file_name(dir, number), options).unwrap();
    for i in 0..50u32 {
        let key = InternalKey::new(format!("k{:03}", i).as_bytes(), 1, ValueType::Value);
        builder.add(key.encode(), format!("table{}-{}", number, i).as_bytes()).unwrap();
    }
    builder.finish().unwrap()
}

// =============================================================================
// Test 1: Charges, not entry counts, bound the cache
// =============================================================================
#[test]
fn eviction_by_charge() {
    let cache: LruCache<u32, String> = LruCache::new(100);
    cache.insert(1, "a".into(), 40);
    cache.insert(2, "b".into(), 40);
    assert_eq!(cache.total_charge(), 80);

    // Touch 1 so 2 is the coldest.
    assert!(cache.get(&1).is_some());
    cache.insert(3, "c".into(), 40);
    assert!(cache.get(&2).is_none());
    assert!(cache.get(&1).is_some());
    assert!(cache.get(&3).is_some());
    assert_eq!(cache.total_charge(), 80);
}

// =============================================================================
// Test 2: Entries handed out stay resident until released
// =============================================================================
#[test]
fn held_entries_are_not_evicted() {
    let cache: LruCache<u32, u32> = LruCache::new(2);
    let held = cache.insert(1, 10, 1);
    cache.insert(2, 20, 1);
    // 1 is coldest but pinned, so 2 goes instead.
    cache.insert(3, 30, 1);
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&2).is_none());
    assert_eq!(*held, 10);

    // Released, 1 ages out like any other entry.
    drop(held);
    cache.insert(4, 40, 1);
    cache.insert(5, 50, 1);
    assert!(cache.get(&1).is_none());
    assert_eq!(cache.total_charge(), 2);
}

// =============================================================================
// Test 3: Erase and zero capacity
// =============================================================================
#[test]
fn erase_and_zero_capacity() {
    let cache: LruCache<&str, u32> = LruCache::new(10);
    cache.insert("x", 1, 3);
    cache.erase(&"x");
    assert!(cache.is_empty());
    assert_eq!(cache.total_charge(), 0);

    let none: LruCache<&str, u32> = LruCache::new(0);
    assert_eq!(*none.insert("x", 7, 1), 7);
    assert!(none.get(&"x").is_none());
}

// =============================================================================
// Test 4: Table cache opens each table once and bounds open files
// =============================================================================
#[test]
fn table_cache_reuses_and_evicts() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options {
        max_open_files: 2,
        ..Options::default()
    };
    let sizes: Vec<u64> = (1..=3).map(|n| write_table(dir.path(), n, &options)).collect();
    let cache = TableCache::new(dir.path().to_path_buf(), options, None);

    let first = cache.get(1, sizes[0]).unwrap();
    let again = cache.get(1, sizes[0]).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    drop((first, again));

    cache.get(2, sizes[1]).unwrap();
    cache.get(3, sizes[2]).unwrap();
    assert_eq!(cache.len(), 2);

    cache.evict(3);
    assert_eq!(cache.len(), 1);
}

// =============================================================================
// Test 5: Lookups and scans through the table cache
// =============================================================================
#[test]
fn table_cache_reads() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options::default();
    let size = write_table(dir.path(), 7, &options);
    let cache = TableCache::new(dir.path().to_path_buf(), options, None);
    let read = ReadOptions::default();

    let target = InternalKey::new(b"k010", MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
    let (_, value) = cache.internal_get(&read, 7, size, target.encode()).unwrap().unwrap();
    assert_eq!(value, b"table7-10");

    let mut it = cache.iter(&read, 7, size).unwrap();
    it.seek_to_first().unwrap();
    let mut n = 0;
    while it.is_valid() {
        n += 1;
        it.next().unwrap();
    }
    assert_eq!(n, 50);

    // A table that is not there is an IO error, not a panic.
    assert!(cache.get(8, size).is_err());
}
