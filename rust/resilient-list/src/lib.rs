//! An index-addressable list that keeps working under memory pressure.
//!
//! [`ResilientList`] stores elements in segments viewed by window nodes, grouped
//! into regions whose cached counters let index lookup skip whole runs of nodes.
//! When a segment cannot be allocated the list degrades to single-element nodes;
//! when the unwritten storage of a large segment is reclaimed through the
//! [`ChunkCache`], the segment continues from the pages it had written.

mod cache;
mod chunk;
mod config;
mod growth;
mod inspect;
mod list;
mod location;
mod node;
mod region;
mod segment;

pub use cache::ChunkCache;
pub use config::{CHUNK_SIZE, INITIAL_CAPACITY, ResilientListConfig, THRESHOLD};
pub use list::ResilientList;
pub use resilient_common::{Error, ErrorKind, Result};
pub use segment::SegmentKind;
