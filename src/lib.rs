//! Tablestats: background table statistics for an LSM store
//!
//! ## Features
//! - Per-table stats (entries, point deletions, range deletions, reclaimable
//!   byte estimates) computed off the write path
//! - Defragmentation of range-deletion fragments back into logical tombstones
//! - At most one background collection pass, enable/disable at runtime
//! - Events when stats finish loading
//!
//! ## Architecture
//! - Manifest layer: `Version` of live tables per level, changed by `VersionEdit`
//! - Reader layer: `TableReader` yields point entries and range-deletion fragments
//! - Stats layer: `estimate_table_stats` per table, driven by `TableStatsCollector`
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use tablestats::{EventListener, InMemoryTableReader, StatsConfig, TableMetadata, TableStatsCollector};
//!
//! # fn main() -> tablestats::Result<()> {
//! let reader = Arc::new(InMemoryTableReader::new());
//! let collector = TableStatsCollector::new(StatsConfig::default(), reader, EventListener::new())?;
//! collector.notify_table_added(0, TableMetadata::new(1, "a", "z", 0))?;
//! collector.wait_for_pending_stats()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod fixture;
pub mod storage;

mod error;

pub use config::StatsConfig;
pub use error::{Result, StorageError};

pub use storage::{
    default_comparer, defragment, estimate_table_stats, fragment_range_dels, BackgroundError,
    BytewiseComparer, Comparer, DefragmentedTombstone, EventListener, FileNum,
    InMemoryTableReader, LoadedTableStats, PointEntry, PointKind, RangeDel, SeqNum, Span,
    TableContents, TableMetadata, TableReader, TableStats, TableStatsCollector, TableStatsInfo,
    Version, VersionEdit,
};
