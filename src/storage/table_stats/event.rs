//! Events published by the collector
//!
//! Listeners run on the collector's background thread with no lock held, so
//! they may call back into the collector. They must not block waiting for
//! the collection they are being notified about.

use super::TableStats;
use crate::storage::keyspan::FileNum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stats installed on one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedTableStats {
    pub file_num: FileNum,
    pub level: usize,
    pub stats: TableStats,
}

/// Tables whose stats went from absent to populated since the last event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatsInfo {
    pub job_id: u64,
    pub tables: Vec<LoadedTableStats>,
}

impl fmt::Display for TableStatsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[JOB {}] all initial table stats loaded", self.job_id)?;
        for t in &self.tables {
            write!(
                f,
                "\n  L{} {:06}: entries={} point-dels={} range-dels={} range-dels-bytes={}",
                t.level,
                t.file_num,
                t.stats.num_entries,
                t.stats.num_point_deletions,
                t.stats.num_range_deletions,
                t.stats.range_deletions_bytes_estimate
            )?;
        }
        Ok(())
    }
}

/// A table whose estimation failed; it stays pending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundError {
    pub job_id: u64,
    pub file_num: FileNum,
    pub error: String,
}

pub type StatsLoadedCallback = Arc<dyn Fn(&TableStatsInfo) + Send + Sync>;
pub type BackgroundErrorCallback = Arc<dyn Fn(&BackgroundError) + Send + Sync>;

/// Optional callbacks for collector events
#[derive(Clone, Default)]
pub struct EventListener {
    pub table_stats_loaded: Option<StatsLoadedCallback>,
    pub background_error: Option<BackgroundErrorCallback>,
}

impl EventListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_table_stats_loaded<F>(mut self, f: F) -> Self
    where
        F: Fn(&TableStatsInfo) + Send + Sync + 'static,
    {
        self.table_stats_loaded = Some(Arc::new(f));
        self
    }

    pub fn on_background_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&BackgroundError) + Send + Sync + 'static,
    {
        self.background_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn table_stats_loaded(&self, info: &TableStatsInfo) {
        if let Some(cb) = &self.table_stats_loaded {
            cb(info);
        }
    }

    pub(crate) fn background_error(&self, err: &BackgroundError) {
        if let Some(cb) = &self.background_error {
            cb(err);
        }
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("table_stats_loaded", &self.table_stats_loaded.is_some())
            .field("background_error", &self.background_error.is_some())
            .finish()
    }
}
