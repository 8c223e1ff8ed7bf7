//! JSON fixtures describing a set of tables
//!
//! Used by `tablestats-cli` and by tests. A fixture lists tables with their
//! level, point entries and unfragmented range deletions; keys are UTF-8
//! strings. Range deletions are fragmented per table before they reach the
//! reader, the way a table writer would store them.

use crate::config::StatsConfig;
use crate::storage::comparator::{default_comparer, Comparer};
use crate::storage::keyspan::{fragment_range_dels, FileNum, RangeDel, SeqNum};
use crate::storage::manifest::{TableMetadata, Version, VersionEdit};
use crate::storage::reader::{InMemoryTableReader, PointEntry, TableContents};
use crate::storage::table_stats::{
    BackgroundError, EventListener, TableStats, TableStatsCollector, TableStatsInfo,
};
use crate::{Result, StorageError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub num_levels: Option<usize>,
    pub tables: Vec<FixtureTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureTable {
    pub file_num: FileNum,
    #[serde(default)]
    pub level: usize,
    /// On-disk size; defaults to the raw size of the entries
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub points: Vec<FixturePoint>,
    #[serde(default)]
    pub range_dels: Vec<FixtureRangeDel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureKind {
    Set,
    Del,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturePoint {
    pub key: String,
    pub seq: SeqNum,
    pub kind: FixtureKind,
    #[serde(default)]
    pub value_len: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureRangeDel {
    pub start: String,
    pub end: String,
    pub seq: SeqNum,
}

/// One live table after collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub level: usize,
    pub file_num: FileNum,
    pub smallest: String,
    pub largest: String,
    pub size: u64,
    pub stats: Option<TableStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureReport {
    pub event: Option<TableStatsInfo>,
    pub tables: Vec<TableReport>,
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build the reader contents and the version edit adding every table
    pub fn build(&self, cmp: &dyn Comparer) -> Result<(InMemoryTableReader, VersionEdit)> {
        let reader = InMemoryTableReader::new();
        let mut edit = VersionEdit::new();

        for table in &self.tables {
            let points: Vec<PointEntry> = table
                .points
                .iter()
                .map(|p| match p.kind {
                    FixtureKind::Set => PointEntry::set(p.key.as_bytes(), p.seq, p.value_len),
                    FixtureKind::Del => PointEntry::delete(p.key.as_bytes(), p.seq),
                })
                .collect();
            let dels: Vec<RangeDel> = table
                .range_dels
                .iter()
                .map(|d| RangeDel::new(d.start.as_bytes(), d.end.as_bytes(), d.seq))
                .collect();
            let (smallest, largest) = table_bounds(table.file_num, &points, &dels, cmp)?;

            let contents = TableContents::new(points, fragment_range_dels(&dels, cmp), cmp);
            let size = table.size.unwrap_or_else(|| contents.raw_size());
            reader.insert_table(table.file_num, contents);
            edit.add_table(
                table.level,
                TableMetadata::new(table.file_num, smallest, largest, size),
            );
        }
        Ok((reader, edit))
    }

    /// Install every table, run one collection pass and report
    ///
    /// A table whose stats cannot be computed fails the whole run with
    /// `InvalidData` naming that table.
    pub fn run(&self, mut config: StatsConfig) -> Result<FixtureReport> {
        if let Some(num_levels) = self.num_levels {
            config.num_levels = num_levels;
        }
        config.disabled = false;
        let cmp = default_comparer();
        let (reader, edit) = self.build(cmp.as_ref())?;

        let mut version = Version::new(config.num_levels);
        version.apply(edit, cmp.as_ref())?;

        let first_error: Arc<Mutex<Option<BackgroundError>>> = Arc::new(Mutex::new(None));
        let slot = first_error.clone();
        let listener = EventListener::new().on_background_error(move |err| {
            let mut first = slot.lock();
            if first.is_none() {
                *first = Some(err.clone());
            }
        });

        let collector =
            TableStatsCollector::open(config, version, Arc::new(reader), cmp, listener)?;
        collector.wait_for_idle()?;
        let failed = first_error.lock().take();
        if let Some(err) = failed {
            collector.close();
            return Err(StorageError::InvalidData(format!(
                "table {:06}: {}",
                err.file_num, err.error
            )));
        }
        let event = collector.wait_for_initial_load()?;
        let tables = collector
            .current_live_tables()
            .into_iter()
            .map(|(level, t)| TableReport {
                level,
                file_num: t.file_num,
                smallest: String::from_utf8_lossy(&t.smallest).into_owned(),
                largest: String::from_utf8_lossy(&t.largest).into_owned(),
                size: t.size,
                stats: t.stats,
            })
            .collect();
        collector.close();

        Ok(FixtureReport { event, tables })
    }
}

fn table_bounds(
    file_num: FileNum,
    points: &[PointEntry],
    dels: &[RangeDel],
    cmp: &dyn Comparer,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let lows = points
        .iter()
        .map(|p| p.key.as_slice())
        .chain(dels.iter().map(|d| d.start.as_slice()));
    let highs = points
        .iter()
        .map(|p| p.key.as_slice())
        .chain(dels.iter().map(|d| d.end.as_slice()));

    let smallest = lows.min_by(|a, b| cmp.compare(a, b));
    let largest = highs.max_by(|a, b| cmp.compare(a, b));
    match (smallest, largest) {
        (Some(s), Some(l)) => Ok((s.to_vec(), l.to_vec())),
        _ => Err(StorageError::InvalidData(format!(
            "table {:06} has no entries",
            file_num
        ))),
    }
}
