pub mod lru;
pub mod table_cache;

pub use lru::LruCache;
pub use table_cache::TableCache;

use crate::sstable::block::Block;

/// Decoded data blocks keyed by (file number, block offset), charged by size.
pub type BlockCache = LruCache<(u64, u64), Block>;
