//! Version and table metadata management

use crate::storage::comparator::Comparer;
use crate::storage::keyspan::FileNum;
use crate::storage::table_stats::TableStats;
use crate::{Result, StorageError};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Metadata of one live table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Unique table identifier, never reused
    pub file_num: FileNum,
    /// Smallest user key
    pub smallest: Vec<u8>,
    /// Largest user key
    pub largest: Vec<u8>,
    /// File size in bytes
    pub size: u64,
    /// `None` until the collector has loaded this table
    pub stats: Option<TableStats>,
}

impl TableMetadata {
    pub fn new(
        file_num: FileNum,
        smallest: impl Into<Vec<u8>>,
        largest: impl Into<Vec<u8>>,
        size: u64,
    ) -> Self {
        Self {
            file_num,
            smallest: smallest.into(),
            largest: largest.into(),
            size,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: TableStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn stats_valid(&self) -> bool {
        self.stats.is_some()
    }
}

/// Result of applying an edit
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    /// Tables that became live without stats
    pub added_without_stats: Vec<FileNum>,
    /// Tables that are no longer live
    pub removed: Vec<FileNum>,
}

/// Snapshot of the live tables, per level
#[derive(Debug, Clone)]
pub struct Version {
    /// Version number, bumped by every applied edit
    pub number: u64,
    levels: Vec<Vec<TableMetadata>>,
    /// file_num -> level
    index: AHashMap<FileNum, usize>,
}

impl Version {
    pub fn new(num_levels: usize) -> Self {
        Self {
            number: 0,
            levels: vec![Vec::new(); num_levels],
            index: AHashMap::new(),
        }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Tables of one level (L0 by file number, L1+ by smallest key)
    pub fn level(&self, level: usize) -> &[TableMetadata] {
        self.levels.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All live tables with their level, level by level
    pub fn live_tables(&self) -> impl Iterator<Item = (usize, &TableMetadata)> {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(level, tables)| tables.iter().map(move |t| (level, t)))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, file_num: FileNum) -> bool {
        self.index.contains_key(&file_num)
    }

    pub fn find(&self, file_num: FileNum) -> Option<(usize, &TableMetadata)> {
        let level = *self.index.get(&file_num)?;
        self.levels[level]
            .iter()
            .find(|t| t.file_num == file_num)
            .map(|t| (level, t))
    }

    /// Live tables whose stats have not been loaded
    pub fn tables_without_stats(&self) -> Vec<FileNum> {
        self.live_tables()
            .filter(|(_, t)| !t.stats_valid())
            .map(|(_, t)| t.file_num)
            .collect()
    }

    /// Install stats on a live table that has none
    ///
    /// Returns `false` when the table is gone or already has stats.
    pub(crate) fn install_stats(&mut self, file_num: FileNum, stats: TableStats) -> bool {
        let Some(&level) = self.index.get(&file_num) else {
            return false;
        };
        match self.levels[level].iter_mut().find(|t| t.file_num == file_num) {
            Some(table) if table.stats.is_none() => {
                table.stats = Some(stats);
                true
            }
            _ => false,
        }
    }

    /// Apply `edit` atomically: on error the version is unchanged
    ///
    /// A table deleted and re-added in the same edit (a move between levels)
    /// keeps its stats and is not reported as added or removed.
    pub fn apply(&mut self, edit: VersionEdit, cmp: &dyn Comparer) -> Result<EditOutcome> {
        self.validate(&edit)?;

        let mut removed: AHashMap<FileNum, TableMetadata> = AHashMap::new();
        for (level, file_num) in &edit.deleted_tables {
            let tables = &mut self.levels[*level];
            if let Some(pos) = tables.iter().position(|t| t.file_num == *file_num) {
                removed.insert(*file_num, tables.remove(pos));
                self.index.remove(file_num);
            }
        }

        let mut outcome = EditOutcome::default();
        let mut touched = AHashSet::new();
        for (level, mut table) in edit.new_tables {
            if let Some(old) = removed.remove(&table.file_num) {
                if table.stats.is_none() {
                    table.stats = old.stats;
                }
            }
            if table.stats.is_none() {
                outcome.added_without_stats.push(table.file_num);
            }
            self.index.insert(table.file_num, level);
            self.levels[level].push(table);
            touched.insert(level);
        }
        outcome.removed = removed.keys().copied().collect();
        outcome.removed.sort_unstable();

        for level in touched {
            self.sort_level(level, cmp);
        }
        self.number += 1;
        Ok(outcome)
    }

    fn validate(&self, edit: &VersionEdit) -> Result<()> {
        let mut deleted = AHashSet::new();
        for (level, file_num) in &edit.deleted_tables {
            if !self.level(*level).iter().any(|t| t.file_num == *file_num) {
                return Err(StorageError::InvalidArgument(format!(
                    "cannot delete table {:06}: not live in L{}",
                    file_num, level
                )));
            }
            if !deleted.insert(*file_num) {
                return Err(StorageError::InvalidArgument(format!(
                    "table {:06} deleted twice in one edit",
                    file_num
                )));
            }
        }

        let mut added = AHashSet::new();
        for (level, table) in &edit.new_tables {
            if *level >= self.num_levels() {
                return Err(StorageError::InvalidArgument(format!(
                    "level {} out of range (num_levels = {})",
                    level,
                    self.num_levels()
                )));
            }
            if self.contains(table.file_num) && !deleted.contains(&table.file_num) {
                return Err(StorageError::InvalidArgument(format!(
                    "table {:06} is already live",
                    table.file_num
                )));
            }
            if !added.insert(table.file_num) {
                return Err(StorageError::InvalidArgument(format!(
                    "table {:06} added twice in one edit",
                    table.file_num
                )));
            }
        }
        Ok(())
    }

    fn sort_level(&mut self, level: usize, cmp: &dyn Comparer) {
        let tables = &mut self.levels[level];
        if level == 0 {
            tables.sort_by_key(|t| t.file_num);
        } else {
            tables.sort_by(|a, b| match cmp.compare(&a.smallest, &b.smallest) {
                Ordering::Equal => a.file_num.cmp(&b.file_num),
                ord => ord,
            });
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (level, tables) in self.levels.iter().enumerate() {
            if tables.is_empty() {
                continue;
            }
            writeln!(f, "L{}:", level)?;
            for t in tables {
                writeln!(
                    f,
                    "  {:06}:[{}-{}]",
                    t.file_num,
                    String::from_utf8_lossy(&t.smallest),
                    String::from_utf8_lossy(&t.largest)
                )?;
            }
        }
        Ok(())
    }
}

/// Batch of table additions and deletions (flush, compaction, ingest)
#[derive(Debug, Clone, Default)]
pub struct VersionEdit {
    /// Tables to add: (level, metadata)
    pub new_tables: Vec<(usize, TableMetadata)>,
    /// Tables to delete: (level, file_num)
    pub deleted_tables: Vec<(usize, FileNum)>,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, level: usize, table: TableMetadata) -> &mut Self {
        self.new_tables.push((level, table));
        self
    }

    pub fn delete_table(&mut self, level: usize, file_num: FileNum) -> &mut Self {
        self.deleted_tables.push((level, file_num));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.new_tables.is_empty() && self.deleted_tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::comparator::BytewiseComparer;

    fn stats(n: u64) -> TableStats {
        TableStats {
            num_entries: n,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_add_and_delete() {
        let mut v = Version::new(7);
        let mut edit = VersionEdit::new();
        edit.add_table(0, TableMetadata::new(5, "a", "c", 100))
            .add_table(0, TableMetadata::new(4, "b", "d", 100));
        let outcome = v.apply(edit, &BytewiseComparer).unwrap();
        assert_eq!(outcome.added_without_stats, vec![5, 4]);
        assert!(outcome.removed.is_empty());
        assert_eq!(v.number, 1);
        assert_eq!(v.len(), 2);
        // L0 ordered by file number.
        let l0: Vec<FileNum> = v.level(0).iter().map(|t| t.file_num).collect();
        assert_eq!(l0, vec![4, 5]);

        let mut edit = VersionEdit::new();
        edit.delete_table(0, 4);
        let outcome = v.apply(edit, &BytewiseComparer).unwrap();
        assert_eq!(outcome.removed, vec![4]);
        assert!(!v.contains(4));
        assert!(v.contains(5));
    }

    #[test]
    fn test_lower_levels_sorted_by_key() {
        let mut v = Version::new(3);
        let mut edit = VersionEdit::new();
        edit.add_table(1, TableMetadata::new(1, "m", "p", 1))
            .add_table(1, TableMetadata::new(2, "a", "c", 1))
            .add_table(1, TableMetadata::new(3, "e", "g", 1));
        v.apply(edit, &BytewiseComparer).unwrap();
        let l1: Vec<FileNum> = v.level(1).iter().map(|t| t.file_num).collect();
        assert_eq!(l1, vec![2, 3, 1]);
    }

    #[test]
    fn test_invalid_edits_leave_version_unchanged() {
        let mut v = Version::new(2);
        let mut edit = VersionEdit::new();
        edit.add_table(0, TableMetadata::new(1, "a", "b", 1));
        v.apply(edit, &BytewiseComparer).unwrap();

        let mut dup = VersionEdit::new();
        dup.add_table(1, TableMetadata::new(1, "a", "b", 1));
        assert!(matches!(v.apply(dup, &BytewiseComparer), Err(StorageError::InvalidArgument(_))));

        let mut bad_level = VersionEdit::new();
        bad_level.add_table(2, TableMetadata::new(9, "a", "b", 1));
        assert!(v.apply(bad_level, &BytewiseComparer).is_err());

        let mut missing = VersionEdit::new();
        missing
            .add_table(0, TableMetadata::new(10, "a", "b", 1))
            .delete_table(1, 1);
        assert!(v.apply(missing, &BytewiseComparer).is_err());

        assert_eq!(v.number, 1);
        assert_eq!(v.len(), 1);
        assert!(!v.contains(10));
    }

    #[test]
    fn test_move_keeps_stats() {
        let mut v = Version::new(7);
        let mut edit = VersionEdit::new();
        edit.add_table(0, TableMetadata::new(1, "a", "b", 1));
        v.apply(edit, &BytewiseComparer).unwrap();
        assert!(v.install_stats(1, stats(3)));
        assert!(!v.install_stats(1, stats(4)), "stats are write-once");

        let mut edit = VersionEdit::new();
        edit.delete_table(0, 1)
            .add_table(1, TableMetadata::new(1, "a", "b", 1));
        let outcome = v.apply(edit, &BytewiseComparer).unwrap();
        assert!(outcome.added_without_stats.is_empty());
        assert!(outcome.removed.is_empty());
        let (level, table) = v.find(1).unwrap();
        assert_eq!(level, 1);
        assert_eq!(table.stats, Some(stats(3)));
    }

    #[test]
    fn test_install_stats_on_missing_table() {
        let mut v = Version::new(1);
        assert!(!v.install_stats(42, stats(1)));
    }

    #[test]
    fn test_tables_without_stats_and_display() {
        let mut v = Version::new(3);
        let mut edit = VersionEdit::new();
        edit.add_table(0, TableMetadata::new(7, "a", "c", 1))
            .add_table(2, TableMetadata::new(3, "d", "f", 1).with_stats(stats(1)));
        v.apply(edit, &BytewiseComparer).unwrap();
        assert_eq!(v.tables_without_stats(), vec![7]);
        assert_eq!(v.to_string(), "L0:\n  000007:[a-c]\nL2:\n  000003:[d-f]\n");
    }
}
