use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::bloom::{BloomFilterPolicy, FilterPolicy};
use crate::comparator::{BytewiseComparator, Comparator};
use crate::error::{Error, Result};
use crate::types::SequenceNumber;
use crate::wal::SyncPolicy;

/// Configuration for the storage engine.
#[derive(Clone)]
pub struct Options {
    /// Orders user keys. Its name is persisted; reopening with a different
    /// comparator fails.
    pub comparator: Arc<dyn Comparator>,
    pub create_if_missing: bool,
    pub error_if_exists: bool,
    /// Verify every checksum read and fail on WAL corruption instead of
    /// skipping it.
    pub paranoid_checks: bool,

    /// Memtable size before it is frozen and flushed.
    pub write_buffer_size: usize,
    /// Capacity of the table cache, in open tables.
    pub max_open_files: usize,
    /// Bytes of decoded blocks kept in memory. 0 disables the block cache.
    pub block_cache_capacity: usize,
    /// Approximate uncompressed size of a data block.
    pub block_size: usize,
    pub block_restart_interval: usize,
    /// Compaction cuts output tables at this size.
    pub max_file_size: u64,
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    pub l0_compaction_trigger: usize,
    pub l0_slowdown_writes_trigger: usize,
    pub l0_stop_writes_trigger: usize,
    /// Highest level a flushed memtable may be pushed to.
    pub max_mem_compact_level: usize,
    /// Size budget of level 1; each deeper level gets 10x more.
    pub level1_max_bytes: u64,
    /// Delay applied once per write when level 0 nears the stop trigger.
    pub slowdown_delay: Duration,
    /// Pause before retrying after a background failure.
    pub background_error_backoff: Duration,
    pub sync_policy: SyncPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            comparator: Arc::new(BytewiseComparator),
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            write_buffer_size: 4 * 1024 * 1024,
            max_open_files: 1000,
            block_cache_capacity: 8 * 1024 * 1024,
            block_size: 4096,
            block_restart_interval: 16,
            max_file_size: 2 * 1024 * 1024,
            filter_policy: Some(Arc::new(BloomFilterPolicy::new(10))),
            l0_compaction_trigger: 4,
            l0_slowdown_writes_trigger: 8,
            l0_stop_writes_trigger: 12,
            max_mem_compact_level: 2,
            level1_max_bytes: 10 * 1024 * 1024,
            slowdown_delay: Duration::from_millis(1),
            background_error_backoff: Duration::from_secs(1),
            sync_policy: SyncPolicy::Manual,
        }
    }
}

impl Options {
    /// Parse TOML into options. Keys left out keep their defaults.
    ///
    /// ```toml
    /// create_if_missing = true
    /// write_buffer_size = 1048576
    /// bloom_bits_per_key = 10
    /// sync_policy = { every_n_writes = 8 }
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: OptionsConfig = toml::from_str(s)
            .map_err(|e| Error::InvalidArgument(format!("bad options: {}", e)))?;
        Ok(config.apply(Options::default()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Clamp values that would break an invariant of the engine.
    pub(crate) fn sanitize(mut self) -> Self {
        self.max_open_files = self.max_open_files.max(1);
        self.block_size = self.block_size.max(1);
        self.block_restart_interval = self.block_restart_interval.max(1);
        self.max_file_size = self.max_file_size.max(1);
        self.write_buffer_size = self.write_buffer_size.max(1);
        self.l0_compaction_trigger = self.l0_compaction_trigger.max(1);
        self.l0_slowdown_writes_trigger = self
            .l0_slowdown_writes_trigger
            .max(self.l0_compaction_trigger);
        self.l0_stop_writes_trigger = self
            .l0_stop_writes_trigger
            .max(self.l0_slowdown_writes_trigger);
        self.max_mem_compact_level = self.max_mem_compact_level.min(crate::version::NUM_LEVELS - 2);
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.name())
            .field("create_if_missing", &self.create_if_missing)
            .field("error_if_exists", &self.error_if_exists)
            .field("paranoid_checks", &self.paranoid_checks)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("max_open_files", &self.max_open_files)
            .field("block_cache_capacity", &self.block_cache_capacity)
            .field("block_size", &self.block_size)
            .field("max_file_size", &self.max_file_size)
            .field(
                "filter_policy",
                &self.filter_policy.as_ref().map(|p| p.name().to_string()),
            )
            .field("l0_compaction_trigger", &self.l0_compaction_trigger)
            .field("l0_slowdown_writes_trigger", &self.l0_slowdown_writes_trigger)
            .field("l0_stop_writes_trigger", &self.l0_stop_writes_trigger)
            .field("sync_policy", &self.sync_policy)
            .finish_non_exhaustive()
    }
}

/// The file-loadable subset of [`Options`]. Comparators and filter policies
/// are code, so only the bloom filter width is configurable here.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsConfig {
    pub create_if_missing: Option<bool>,
    pub error_if_exists: Option<bool>,
    pub paranoid_checks: Option<bool>,
    pub write_buffer_size: Option<usize>,
    pub max_open_files: Option<usize>,
    pub block_cache_capacity: Option<usize>,
    pub block_size: Option<usize>,
    pub block_restart_interval: Option<usize>,
    pub max_file_size: Option<u64>,
    /// 0 disables the filter.
    pub bloom_bits_per_key: Option<usize>,
    pub l0_compaction_trigger: Option<usize>,
    pub l0_slowdown_writes_trigger: Option<usize>,
    pub l0_stop_writes_trigger: Option<usize>,
    pub max_mem_compact_level: Option<usize>,
    pub level1_max_bytes: Option<u64>,
    pub slowdown_delay_ms: Option<u64>,
    pub background_error_backoff_ms: Option<u64>,
    pub sync_policy: Option<SyncPolicy>,
}

impl OptionsConfig {
    pub fn apply(self, mut opts: Options) -> Options {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field { opts.$field = v; })*
            };
        }
        set!(
            create_if_missing,
            error_if_exists,
            paranoid_checks,
            write_buffer_size,
            max_open_files,
            block_cache_capacity,
            block_size,
            block_restart_interval,
            max_file_size,
            l0_compaction_trigger,
            l0_slowdown_writes_trigger,
            l0_stop_writes_trigger,
            max_mem_compact_level,
            level1_max_bytes,
            sync_policy
        );
        if let Some(bits) = self.bloom_bits_per_key {
            opts.filter_policy = if bits == 0 {
                None
            } else {
                Some(Arc::new(BloomFilterPolicy::new(bits)))
            };
        }
        if let Some(ms) = self.slowdown_delay_ms {
            opts.slowdown_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.background_error_backoff_ms {
            opts.background_error_backoff = Duration::from_millis(ms);
        }
        opts
    }
}

/// Per-read knobs.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Verify block checksums on every read (always on with `paranoid_checks`).
    pub verify_checksums: bool,
    /// Keep blocks read for this operation in the block cache.
    pub fill_cache: bool,
    /// Read as of this sequence number instead of the latest state.
    pub snapshot: Option<SequenceNumber>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            verify_checksums: false,
            fill_cache: true,
            snapshot: None,
        }
    }
}

/// Per-write knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// fsync the log before acknowledging the write.
    pub sync: bool,
}
