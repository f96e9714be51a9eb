use std::fmt;

use crate::compaction::CompactionStats;
use crate::types::SequenceNumber;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelStats {
    pub files: usize,
    pub bytes: u64,
    /// Compactions whose output landed in this level.
    pub compaction: CompactionStats,
}

/// A point-in-time summary of the engine, from [`crate::DB::stats`].
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub levels: Vec<LevelStats>,
    pub last_sequence: SequenceNumber,
    pub memtable_bytes: usize,
    pub immutable_memtable: bool,
    pub live_versions: usize,
    pub snapshots: usize,
    pub open_tables: usize,
}

impl Stats {
    pub fn total_files(&self) -> usize {
        self.levels.iter().map(|l| l.files).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.levels.iter().map(|l| l.bytes).sum()
    }
}

impl fmt::Display for Stats {
    /// ```text
    ///                                Compactions
    /// Level  Files Size(MB) Time(sec) Read(MB) Write(MB)
    /// --------------------------------------------------
    ///   0        2        1         0        0         1
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MB: f64 = 1048576.0;
        writeln!(f, "                               Compactions")?;
        writeln!(f, "Level  Files Size(MB) Time(sec) Read(MB) Write(MB)")?;
        writeln!(f, "--------------------------------------------------")?;
        for (level, l) in self.levels.iter().enumerate() {
            if l.files == 0 && l.compaction.count == 0 {
                continue;
            }
            writeln!(
                f,
                "{:3} {:8} {:8.0} {:9.0} {:8.0} {:9.0}",
                level,
                l.files,
                l.bytes as f64 / MB,
                l.compaction.duration.as_secs_f64(),
                l.compaction.bytes_read as f64 / MB,
                l.compaction.bytes_written as f64 / MB
            )?;
        }
        writeln!(
            f,
            "last_sequence={} memtable={}B imm={} versions={} snapshots={} open_tables={}",
            self.last_sequence,
            self.memtable_bytes,
            self.immutable_memtable,
            self.live_versions,
            self.snapshots,
            self.open_tables
        )
    }
}
