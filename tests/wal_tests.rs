// Write-ahead log: block framing, fragment reassembly, corruption handling.

use std::fs;
use std::path::PathBuf;

use ravel::wal::{BLOCK_SIZE, HEADER_SIZE, LogReader, LogWriter, SyncPolicy};

/// Helper: write the given records to a fresh log, return the path.
fn write_log(dir: &tempfile::TempDir, records: &[Vec<u8>]) -> PathBuf {
    let path = dir.path().join("000001.log");
    let mut writer = LogWriter::create(&path, SyncPolicy::Manual).unwrap();
    for r in records {
        writer.add_record(r).unwrap();
    }
    writer.sync().unwrap();
    path
}

fn read_all(path: &PathBuf, strict: bool) -> Vec<Vec<u8>> {
    let reader = LogReader::open(path, strict).unwrap();
    reader.records().map(|r| r.unwrap()).collect()
}

fn small_records(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("record-{}", i).into_bytes()).collect()
}

// =============================================================================
// Test 1: Records come back in order
// =============================================================================
#[test]
fn read_all_records_back() {
    let dir = tempfile::tempdir().unwrap();
    let records = small_records(5);
    let path = write_log(&dir, &records);
    assert_eq!(read_all(&path, true), records);
}

// =============================================================================
// Test 2: Empty file yields nothing; empty record round-trips
// =============================================================================
#[test]
fn empty_log_and_empty_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_log(&dir, &[]);
    assert!(read_all(&path, true).is_empty());

    let path = write_log(&dir, &[Vec::new(), b"x".to_vec()]);
    assert_eq!(read_all(&path, true), vec![Vec::new(), b"x".to_vec()]);
}

// =============================================================================
// Test 3: A record larger than a block spans fragments
// =============================================================================
#[test]
fn large_record_spans_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let big: Vec<u8> = (0..3 * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
    let records = vec![b"small".to_vec(), big, b"after".to_vec()];
    let path = write_log(&dir, &records);
    assert!(fs::metadata(&path).unwrap().len() > 3 * BLOCK_SIZE as u64);
    assert_eq!(read_all(&path, true), records);
}

// =============================================================================
// Test 4: Block tail too small for a header is padded and skipped
// =============================================================================
#[test]
fn short_block_tail_is_padded() {
    let dir = tempfile::tempdir().unwrap();
    // Leave exactly 3 bytes at the end of the first block.
    let first = vec![b'a'; BLOCK_SIZE - HEADER_SIZE - 3];
    let records = vec![first, b"next".to_vec()];
    let path = write_log(&dir, &records);

    let len = fs::metadata(&path).unwrap().len() as usize;
    assert_eq!(len, BLOCK_SIZE + HEADER_SIZE + 4);
    assert_eq!(read_all(&path, true), records);
}

// =============================================================================
// Test 5: Offset matches file length
// =============================================================================
#[test]
fn offset_tracks_file_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("000002.log");
    let mut writer = LogWriter::create(&path, SyncPolicy::Manual).unwrap();
    writer.add_record(b"hello").unwrap();
    assert_eq!(writer.offset(), (HEADER_SIZE + 5) as u64);
    writer.flush().unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), writer.offset());
}

// =============================================================================
// Test 6: Torn tail (crash mid-append) ends the stream quietly
// =============================================================================
#[test]
fn truncated_tail_yields_preceding() {
    let dir = tempfile::tempdir().unwrap();
    let records = small_records(5);
    let path = write_log(&dir, &records);

    let len = fs::metadata(&path).unwrap().len();
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 3).unwrap();

    // Even the strict reader treats an incomplete last record as a crash.
    assert_eq!(read_all(&path, true), records[..4].to_vec());
}

// =============================================================================
// Test 7: A damaged fragment loses the rest of its block, or fails strict mode
// =============================================================================
#[test]
fn corrupted_record_skipped_or_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = small_records(2);
    // Fill block 0 exactly so the last record starts block 1.
    let used = 2 * (HEADER_SIZE + records[0].len());
    records.push(vec![b'f'; BLOCK_SIZE - used - HEADER_SIZE]);
    records.push(b"in-next-block".to_vec());
    let path = write_log(&dir, &records);

    // Flip a payload byte of the second record.
    let mut data = fs::read(&path).unwrap();
    let second = HEADER_SIZE + records[0].len();
    data[second + HEADER_SIZE] ^= 0xff;
    fs::write(&path, &data).unwrap();

    let reader = LogReader::open(&path, false).unwrap();
    let mut records_iter = reader.records();
    let got: Vec<Vec<u8>> = records_iter.by_ref().map(|r| r.unwrap()).collect();
    assert_eq!(got, vec![records[0].clone(), records[3].clone()]);
    assert_eq!(records_iter.corruptions(), 1);
    assert!(records_iter.dropped_bytes() > 0);

    let strict = LogReader::open(&path, true).unwrap();
    let results: Vec<_> = strict.records().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1].as_ref().is_err_and(|e| e.is_corruption()));
}

// =============================================================================
// Test 8: Reopening for append continues the block framing
// =============================================================================
#[test]
fn append_to_existing_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_log(&dir, &small_records(2));
    {
        let mut writer = LogWriter::append_to(&path, SyncPolicy::Manual).unwrap();
        writer.add_record(b"third").unwrap();
        writer.sync().unwrap();
    }
    let got = read_all(&path, true);
    assert_eq!(got.len(), 3);
    assert_eq!(got[2], b"third");
}

// =============================================================================
// Test 9: Records can be read from memory
// =============================================================================
#[test]
fn reader_from_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let records = small_records(4);
    let path = write_log(&dir, &records);
    let reader = LogReader::from_bytes(fs::read(&path).unwrap(), true);
    let got: Vec<Vec<u8>> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(got, records);
}
