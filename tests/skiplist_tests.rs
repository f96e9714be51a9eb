// Skip list: ordered insert, lookup, iteration and size accounting.

use std::sync::Arc;

use ravel::comparator::BytewiseComparator;
use ravel::iterator::StorageIterator;
use ravel::memtable::skiplist::SkipList;

fn new_list() -> SkipList {
    SkipList::new(Arc::new(BytewiseComparator))
}

fn collect(sl: &SkipList) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut it = sl.iter();
    while it.is_valid() {
        out.push((it.key().to_vec(), it.value().to_vec()));
        it.next().unwrap();
    }
    out
}

// =============================================================================
// Test 1: Insert one key, get it back
// =============================================================================
#[test]
fn insert_one_key_get_it_back() {
    let mut sl = new_list();
    assert!(sl.insert(b"hello".to_vec(), b"world".to_vec()));
    assert_eq!(sl.get(b"hello"), Some(b"world".as_slice()));
    assert_eq!(sl.len(), 1);
}

// =============================================================================
// Test 2: Keys inserted out of order are found
// =============================================================================
#[test]
fn insert_out_of_order() {
    let mut sl = new_list();
    sl.insert(b"b".to_vec(), b"2".to_vec());
    sl.insert(b"a".to_vec(), b"1".to_vec());
    sl.insert(b"c".to_vec(), b"3".to_vec());
    assert_eq!(sl.get(b"a"), Some(b"1".as_slice()));
    assert_eq!(sl.get(b"b"), Some(b"2".as_slice()));
    assert_eq!(sl.get(b"c"), Some(b"3".as_slice()));
}

// =============================================================================
// Test 3: Duplicate insert is refused, first value kept
// =============================================================================
#[test]
fn duplicate_key_is_refused() {
    let mut sl = new_list();
    assert!(sl.insert(b"key".to_vec(), b"old".to_vec()));
    assert!(!sl.insert(b"key".to_vec(), b"new".to_vec()));
    assert_eq!(sl.get(b"key"), Some(b"old".as_slice()));
    assert_eq!(sl.len(), 1);
}

// =============================================================================
// Test 4: Missing keys
// =============================================================================
#[test]
fn get_missing_returns_none() {
    let mut sl = new_list();
    assert_eq!(sl.get(b"x"), None);
    sl.insert(b"m".to_vec(), b"1".to_vec());
    assert_eq!(sl.get(b"a"), None);
    assert_eq!(sl.get(b"z"), None);
    assert!(!sl.is_empty());
}

// =============================================================================
// Test 5: Iteration is sorted regardless of insert order
// =============================================================================
#[test]
fn iteration_is_sorted() {
    let mut sl = new_list();
    for i in [5, 3, 9, 1, 7, 0, 8, 2, 6, 4] {
        sl.insert(format!("key{:02}", i).into_bytes(), vec![i as u8]);
    }
    let entries = collect(&sl);
    assert_eq!(entries.len(), 10);
    for (i, (k, v)) in entries.iter().enumerate() {
        assert_eq!(k, &format!("key{:02}", i).into_bytes());
        assert_eq!(v, &vec![i as u8]);
    }
}

// =============================================================================
// Test 6: Seek lands on the first key >= target
// =============================================================================
#[test]
fn seek_positions_at_or_after_target() {
    let mut sl = new_list();
    for k in ["b", "d", "f"] {
        sl.insert(k.as_bytes().to_vec(), Vec::new());
    }
    let mut it = sl.iter();

    it.seek(b"d").unwrap();
    assert_eq!(it.key(), b"d");

    it.seek(b"c").unwrap();
    assert_eq!(it.key(), b"d");

    it.seek(b"a").unwrap();
    assert_eq!(it.key(), b"b");

    it.seek(b"g").unwrap();
    assert!(!it.is_valid());

    it.seek_to_first().unwrap();
    assert_eq!(it.key(), b"b");
}

// =============================================================================
// Test 7: Empty list iterator is invalid
// =============================================================================
#[test]
fn empty_iterator_is_invalid() {
    let sl = new_list();
    let mut it = sl.iter();
    assert!(!it.is_valid());
    it.next().unwrap();
    assert!(!it.is_valid());
}

// =============================================================================
// Test 8: Size grows with every insert, at least by the payload
// =============================================================================
#[test]
fn size_tracks_payload() {
    let mut sl = new_list();
    assert_eq!(sl.size_bytes(), 0);
    sl.insert(b"key".to_vec(), vec![0u8; 100]);
    let one = sl.size_bytes();
    assert!(one >= 103);
    sl.insert(b"key2".to_vec(), vec![0u8; 100]);
    assert!(sl.size_bytes() >= one + 104);
}

// =============================================================================
// Test 9: Many keys stay sorted and reachable
// =============================================================================
#[test]
fn thousand_keys() {
    let mut sl = new_list();
    for i in (0..1000u32).rev() {
        sl.insert(i.to_be_bytes().to_vec(), i.to_le_bytes().to_vec());
    }
    assert_eq!(sl.len(), 1000);
    for i in 0..1000u32 {
        assert_eq!(sl.get(&i.to_be_bytes()), Some(i.to_le_bytes().as_slice()));
    }
    let keys: Vec<Vec<u8>> = collect(&sl).into_iter().map(|(k, _)| k).collect();
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}
