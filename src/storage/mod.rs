//! Storage layer
//!
//! Table metadata, range-deletion keyspans, and the background statistics
//! engine that keeps every live table's stats populated.

pub mod comparator;
pub mod keyspan;
pub mod manifest;
pub mod reader;
pub mod table_stats;

pub use comparator::{default_comparer, BytewiseComparer, Comparer};
pub use keyspan::{fragment_range_dels, truncate_spans, FileNum, KeyspanKey, RangeDel, SeqNum, Span};
pub use manifest::{EditOutcome, TableMetadata, Version, VersionEdit};
pub use reader::{BoxedIter, InMemoryTableReader, PointEntry, PointKind, TableContents, TableReader};
pub use table_stats::{
    defragment, estimate_table_stats, for_each_defragmented_tombstone, BackgroundError,
    DefragmentedTombstone, EventListener, LoadedTableStats, TableStats, TableStatsCollector,
    TableStatsInfo,
};
