//! Table statistics collection
//!
//! ## Components
//! - **defrag**: coalesces adjacent range-deletion fragments back into the
//!   deletions they were split from
//! - **estimator**: scans one table and produces its [`TableStats`]
//! - **collector**: background scheduler that keeps every live table's
//!   stats populated as versions change
//!
//! Stats are never persisted; they are recomputed for every table when a
//! store is reopened.

mod collector;
mod defrag;
mod estimator;
mod event;

pub use collector::TableStatsCollector;
pub use defrag::{defragment, for_each_defragmented_tombstone, DefragmentedTombstone};
pub use estimator::estimate_table_stats;
pub use event::{BackgroundError, EventListener, LoadedTableStats, TableStatsInfo};

use serde::{Deserialize, Serialize};

/// Statistics computed from a table's content
///
/// Immutable once installed on a table: a rewritten table gets a new file
/// number and new stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    /// Point entries scanned (sets and deletions)
    pub num_entries: u64,

    /// Point deletion markers
    pub num_point_deletions: u64,

    /// Range deletions, counted after defragmentation
    pub num_range_deletions: u64,

    /// Estimated bytes reclaimed by compacting away the point deletions
    pub point_deletions_bytes_estimate: u64,

    /// Estimated bytes of this table's point data covered by its range deletions
    pub range_deletions_bytes_estimate: u64,
}

impl TableStats {
    /// Total bytes a compaction is expected to reclaim from this table
    pub fn reclaimable_bytes_estimate(&self) -> u64 {
        self.point_deletions_bytes_estimate
            .saturating_add(self.range_deletions_bytes_estimate)
    }
}
