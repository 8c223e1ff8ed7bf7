//! Per-table statistics estimation
//!
//! ## Algorithm
//! 1. Defragment the table's range-deletion fragments
//! 2. Scan point entries once, counting deletions and the raw bytes each
//!    defragmented tombstone covers
//! 3. Scale raw byte counts into the table's own on-disk size
//!
//! ## Coverage rule
//! Within a tombstone's `[start, end)`, only the newest version of each user
//! key is considered; older versions are already shadowed and would be
//! dropped by any compaction. That version counts as reclaimable when its
//! seqnum is `<= max_seq_num` of the tombstone. Since defragmented
//! tombstones are disjoint, every entry is counted at most once.
//!
//! The result is an approximation: no exact figure exists without running
//! the compaction.

use super::defrag::{for_each_defragmented_tombstone, DefragmentedTombstone};
use super::TableStats;
use crate::storage::comparator::Comparer;
use crate::storage::manifest::TableMetadata;
use crate::storage::reader::{compare_points, PointEntry, TableReader};
use crate::{Result, StorageError};
use std::cmp::Ordering;
use tracing::debug;

/// Compute stats for `table` from its content
///
/// Any read or corruption error aborts the whole estimation; callers never
/// see partial stats.
pub fn estimate_table_stats(
    reader: &dyn TableReader,
    table: &TableMetadata,
    cmp: &dyn Comparer,
) -> Result<TableStats> {
    let mut tombstones: Vec<DefragmentedTombstone> = Vec::new();
    for_each_defragmented_tombstone(reader.range_del_fragments(table.file_num)?, cmp, |t| {
        tombstones.push(t);
        Ok(())
    })?;

    let mut acc = ScanAccumulator::default();
    let mut cursor = 0;
    let mut prev: Option<PointEntry> = None;

    for entry in reader.point_iter(table.file_num)? {
        let entry = entry?;

        let shadowed = match &prev {
            Some(prev) => {
                if compare_points(cmp, prev, &entry) != Ordering::Less {
                    return Err(StorageError::Corruption(format!(
                        "table {:06}: point entries out of order at seqnum {}",
                        table.file_num, entry.seq_num
                    )));
                }
                cmp.equal(&prev.key, &entry.key)
            }
            None => false,
        };

        acc.observe(&entry);

        while cursor < tombstones.len()
            && cmp.compare(&tombstones[cursor].end, &entry.key) != Ordering::Greater
        {
            cursor += 1;
        }
        if !shadowed {
            if let Some(tombstone) = tombstones.get(cursor) {
                if cmp.compare(&tombstone.start, &entry.key) != Ordering::Greater
                    && entry.seq_num <= tombstone.max_seq_num
                {
                    acc.covered_raw = acc.covered_raw.saturating_add(entry.raw_size());
                }
            }
        }

        prev = Some(entry);
    }

    let stats = acc.finish(table.size, tombstones.len() as u64);
    debug!(
        file_num = table.file_num,
        num_entries = stats.num_entries,
        num_point_deletions = stats.num_point_deletions,
        num_range_deletions = stats.num_range_deletions,
        range_deletions_bytes_estimate = stats.range_deletions_bytes_estimate,
        "estimated table stats"
    );
    Ok(stats)
}

#[derive(Default)]
struct ScanAccumulator {
    num_entries: u64,
    num_point_deletions: u64,
    raw_total: u64,
    set_count: u64,
    set_value_bytes: u64,
    deletion_key_bytes: u64,
    covered_raw: u64,
}

impl ScanAccumulator {
    fn observe(&mut self, entry: &PointEntry) {
        self.num_entries += 1;
        self.raw_total = self.raw_total.saturating_add(entry.raw_size());
        if entry.is_deletion() {
            self.num_point_deletions += 1;
            self.deletion_key_bytes = self
                .deletion_key_bytes
                .saturating_add(entry.key.len() as u64);
        } else {
            self.set_count += 1;
            self.set_value_bytes = self.set_value_bytes.saturating_add(entry.value_len);
        }
    }

    fn finish(self, table_size: u64, num_range_deletions: u64) -> TableStats {
        let avg_value_len = self.set_value_bytes.checked_div(self.set_count).unwrap_or(0);
        let point_deletions_raw = self
            .deletion_key_bytes
            .saturating_add(self.num_point_deletions.saturating_mul(avg_value_len));

        TableStats {
            num_entries: self.num_entries,
            num_point_deletions: self.num_point_deletions,
            num_range_deletions,
            point_deletions_bytes_estimate: scale(point_deletions_raw, self.raw_total, table_size),
            range_deletions_bytes_estimate: scale(self.covered_raw, self.raw_total, table_size),
        }
    }
}

/// Convert raw bytes into the table's on-disk accounting, capped at its size
///
/// A table with unknown size (0) keeps raw byte counts.
fn scale(raw: u64, raw_total: u64, table_size: u64) -> u64 {
    if table_size == 0 {
        return raw;
    }
    if raw_total == 0 {
        return 0;
    }
    let scaled = raw as u128 * table_size as u128 / raw_total as u128;
    scaled.min(table_size as u128) as u64
}
