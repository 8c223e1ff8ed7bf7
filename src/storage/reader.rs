//! Table reader capability
//!
//! The statistics engine never decodes table files itself; it asks a
//! `TableReader` for a table's point entries and range-deletion fragments.

use super::comparator::Comparer;
use super::keyspan::{FileNum, SeqNum, Span};
use crate::{Result, StorageError};
use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Fallible, single-pass iterator handed out by a reader
pub type BoxedIter<'a, T> = Box<dyn Iterator<Item = Result<T>> + Send + 'a>;

/// Kind of a point entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointKind {
    Set,
    Delete,
}

/// One point entry as stored in a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointEntry {
    pub key: Vec<u8>,
    pub seq_num: SeqNum,
    pub kind: PointKind,
    /// Stored value size in bytes (0 for deletions)
    pub value_len: u64,
}

impl PointEntry {
    pub fn set(key: impl Into<Vec<u8>>, seq_num: SeqNum, value_len: u64) -> Self {
        Self {
            key: key.into(),
            seq_num,
            kind: PointKind::Set,
            value_len,
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>, seq_num: SeqNum) -> Self {
        Self {
            key: key.into(),
            seq_num,
            kind: PointKind::Delete,
            value_len: 0,
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.kind == PointKind::Delete
    }

    /// Raw bytes attributed to this entry
    pub fn raw_size(&self) -> u64 {
        (self.key.len() as u64).saturating_add(self.value_len)
    }
}

/// Order of entries inside a table: key ascending, then seqnum descending
pub fn compare_points(cmp: &dyn Comparer, a: &PointEntry, b: &PointEntry) -> Ordering {
    cmp.compare(&a.key, &b.key)
        .then_with(|| b.seq_num.cmp(&a.seq_num))
}

/// Source of table content for statistics
///
/// Both iterators are finite and single pass; asking again reopens the table.
pub trait TableReader: Send + Sync {
    /// Point entries in table order (see [`compare_points`])
    fn point_iter(&self, file_num: FileNum) -> Result<BoxedIter<'_, PointEntry>>;

    /// Range-deletion fragments, disjoint and sorted by start key
    fn range_del_fragments(&self, file_num: FileNum) -> Result<BoxedIter<'_, Span>>;
}

/// Content of one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableContents {
    pub points: Vec<PointEntry>,
    pub range_dels: Vec<Span>,
}

impl TableContents {
    pub fn new(mut points: Vec<PointEntry>, range_dels: Vec<Span>, cmp: &dyn Comparer) -> Self {
        points.sort_by(|a, b| compare_points(cmp, a, b));
        Self { points, range_dels }
    }

    /// Sum of raw entry sizes, a stand-in for the file size
    pub fn raw_size(&self) -> u64 {
        self.points
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.raw_size()))
    }
}

/// Reader over tables held in memory
#[derive(Default)]
pub struct InMemoryTableReader {
    tables: RwLock<AHashMap<FileNum, Arc<TableContents>>>,
}

impl InMemoryTableReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&self, file_num: FileNum, contents: TableContents) {
        self.tables.write().insert(file_num, Arc::new(contents));
    }

    pub fn remove_table(&self, file_num: FileNum) -> Option<Arc<TableContents>> {
        self.tables.write().remove(&file_num)
    }

    pub fn contains(&self, file_num: FileNum) -> bool {
        self.tables.read().contains_key(&file_num)
    }

    fn get(&self, file_num: FileNum) -> Result<Arc<TableContents>> {
        self.tables
            .read()
            .get(&file_num)
            .cloned()
            .ok_or(StorageError::TableNotFound(file_num))
    }
}

impl TableReader for InMemoryTableReader {
    fn point_iter(&self, file_num: FileNum) -> Result<BoxedIter<'_, PointEntry>> {
        let contents = self.get(file_num)?;
        Ok(Box::new(
            (0..contents.points.len()).map(move |i| Ok(contents.points[i].clone())),
        ))
    }

    fn range_del_fragments(&self, file_num: FileNum) -> Result<BoxedIter<'_, Span>> {
        let contents = self.get(file_num)?;
        Ok(Box::new(
            (0..contents.range_dels.len()).map(move |i| Ok(contents.range_dels[i].clone())),
        ))
    }
}
