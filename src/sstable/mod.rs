//! Immutable sorted table files.
//!
//! ```text
//! [data block]* [filter block]? [metaindex block] [index block] [footer]
//! ```
//!
//! Every block is followed by a `[compression:1][crc32:4]` trailer.

pub mod block;
pub mod builder;
pub mod format;
pub mod iterator;
pub mod reader;

pub use builder::TableBuilder;
pub use iterator::TableIterator;
pub use reader::Table;
