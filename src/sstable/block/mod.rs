//! Prefix-compressed sorted blocks, the unit of table I/O and caching.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Entry: [shared][non_shared][value_len][key_delta][value]     │  varints
//! │ ...                                                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Restart array: [offset_0(4B)][offset_1(4B)]...               │
//! │ Num restarts (4B)                                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `restart_interval` entries the key is stored whole (shared = 0) and
//! its offset recorded. Seeks binary search the restart array, then scan.

pub mod builder;
pub mod reader;

pub use builder::BlockBuilder;
pub use reader::{Block, BlockIterator};
