use std::ops::AddAssign;
use std::time::Duration;

/// Work done by compactions whose output landed in one level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub duration: Duration,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub count: u64,
}

impl AddAssign for CompactionStats {
    fn add_assign(&mut self, other: Self) {
        self.duration += other.duration;
        self.bytes_read += other.bytes_read;
        self.bytes_written += other.bytes_written;
        self.count += other.count;
    }
}
