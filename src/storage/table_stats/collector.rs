//! Background table statistics collector
//!
//! ## State machine
//! - **Idle**: nothing pending, disabled, or closed
//! - **Loading**: one background thread drains the pending set
//!
//! ## Locking
//! One mutex guards the live version (including every table's stats slot),
//! the pending set and the collection flags; one condvar signals changes to
//! waiters. Table I/O always runs with the mutex released, and listeners are
//! invoked with it released.
//!
//! ## Invariants
//! - At most one pass runs at a time (`loading` is checked and set under the
//!   lock before a thread is spawned)
//! - A table is pending iff it is live and has no stats; membership changes
//!   together with the version, under the same lock
//! - Stats are written once, and only while the table is still live
//! - A table whose estimation failed is skipped until the next version change
//!   or `enable()`, so a broken table cannot make the worker spin

use super::estimator::estimate_table_stats;
use super::event::{BackgroundError, EventListener, LoadedTableStats, TableStatsInfo};
use super::TableStats;
use crate::config::StatsConfig;
use crate::storage::comparator::{default_comparer, Comparer};
use crate::storage::keyspan::FileNum;
use crate::storage::manifest::{TableMetadata, Version, VersionEdit};
use crate::storage::reader::TableReader;
use crate::{Result, StorageError};
use ahash::AHashSet;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

struct CollectorState {
    version: Version,
    pending: BTreeSet<FileNum>,
    /// Pending tables whose last estimation failed
    failed: AHashSet<FileNum>,
    loading: bool,
    /// Thread running the current pass
    worker: Option<ThreadId>,
    loaded_initial: bool,
    disabled: bool,
    closed: bool,
    next_job_id: u64,
    passes_started: u64,
    /// Loaded since the last published event
    unreported: Vec<LoadedTableStats>,
    last_loaded: Option<TableStatsInfo>,
}

impl CollectorState {
    fn has_runnable_work(&self) -> bool {
        self.pending.iter().any(|f| !self.failed.contains(f))
    }

    fn next_runnable(&self) -> Option<FileNum> {
        self.pending.iter().copied().find(|f| !self.failed.contains(f))
    }
}

struct Shared {
    state: Mutex<CollectorState>,
    cond: Condvar,
    reader: Arc<dyn TableReader>,
    cmp: Arc<dyn Comparer>,
    listener: EventListener,
    thread_name: String,
}

/// Keeps every live table's stats populated in the background
///
/// Dropping the collector closes it.
pub struct TableStatsCollector {
    shared: Arc<Shared>,
}

impl TableStatsCollector {
    /// Collector over an empty version with the bytewise comparer
    pub fn new(
        config: StatsConfig,
        reader: Arc<dyn TableReader>,
        listener: EventListener,
    ) -> Result<Self> {
        let version = Version::new(config.num_levels);
        Self::open(config, version, reader, default_comparer(), listener)
    }

    /// Open over a recovered version
    ///
    /// Stats are not persisted, so every recovered table without stats is
    /// pending and collection starts right away unless configured disabled.
    pub fn open(
        config: StatsConfig,
        recovered: Version,
        reader: Arc<dyn TableReader>,
        cmp: Arc<dyn Comparer>,
        listener: EventListener,
    ) -> Result<Self> {
        config.validate()?;
        if recovered.num_levels() != config.num_levels {
            return Err(StorageError::InvalidArgument(format!(
                "recovered version has {} levels, config expects {}",
                recovered.num_levels(),
                config.num_levels
            )));
        }

        let pending: BTreeSet<FileNum> = recovered.tables_without_stats().into_iter().collect();
        info!(
            version = recovered.number,
            live_tables = recovered.len(),
            pending = pending.len(),
            disabled = config.disabled,
            "opening table stats collector"
        );

        let shared = Arc::new(Shared {
            state: Mutex::new(CollectorState {
                version: recovered,
                pending,
                failed: AHashSet::new(),
                loading: false,
                worker: None,
                loaded_initial: false,
                disabled: config.disabled,
                closed: false,
                next_job_id: 1,
                passes_started: 0,
                unreported: Vec::new(),
                last_loaded: None,
            }),
            cond: Condvar::new(),
            reader,
            cmp,
            listener,
            thread_name: config.worker_thread_name,
        });

        {
            let mut state = shared.state.lock();
            maybe_collect_locked(&shared, &mut state);
        }
        Ok(Self { shared })
    }

    /// Resume scheduling; failed tables become eligible again
    pub fn enable(&self) {
        let mut state = self.shared.state.lock();
        if state.disabled {
            info!("table stats collection enabled");
        }
        state.disabled = false;
        state.failed.clear();
        maybe_collect_locked(&self.shared, &mut state);
    }

    /// Stop scheduling new work; an in-flight table still completes
    pub fn disable(&self) {
        let mut state = self.shared.state.lock();
        if !state.disabled {
            info!("table stats collection disabled");
        }
        state.disabled = true;
    }

    /// Apply a version edit and schedule stats for tables it adds
    ///
    /// Tables the edit removes leave the pending set in the same critical
    /// section. Returns the new version number.
    pub fn install_version(&self, edit: VersionEdit) -> Result<u64> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }

        let outcome = state.version.apply(edit, self.shared.cmp.as_ref())?;
        for file_num in &outcome.removed {
            state.pending.remove(file_num);
        }
        for file_num in &outcome.added_without_stats {
            state.pending.insert(*file_num);
        }
        state.failed.clear();

        debug!(
            version = state.version.number,
            added = outcome.added_without_stats.len(),
            removed = outcome.removed.len(),
            pending = state.pending.len(),
            "installed version"
        );
        maybe_collect_locked(&self.shared, &mut state);
        Ok(state.version.number)
    }

    /// Register one new table (flush output, ingested file)
    pub fn notify_table_added(&self, level: usize, table: TableMetadata) -> Result<u64> {
        let mut edit = VersionEdit::new();
        edit.add_table(level, table);
        self.install_version(edit)
    }

    /// Block until the pending set is empty and no pass is running
    ///
    /// Does not time out: with collection disabled, or a table that keeps
    /// failing, this waits for the next `enable()` or version change to
    /// make progress. Returns `Closed` if the collector closes first.
    pub fn wait_for_pending_stats(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        while state.loading || !state.pending.is_empty() {
            if state.closed {
                return Err(StorageError::Closed);
            }
            self.shared.cond.wait(&mut state);
        }
        Ok(())
    }

    /// Block until no pass is running
    ///
    /// Unlike the other waits this returns after a pass that ended with
    /// failed tables still pending.
    pub fn wait_for_idle(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        while state.loading {
            if state.closed {
                return Err(StorageError::Closed);
            }
            self.shared.cond.wait(&mut state);
        }
        Ok(())
    }

    /// Block until the first full drain since open, then return the last
    /// published event
    pub fn wait_for_initial_load(&self) -> Result<Option<TableStatsInfo>> {
        let mut state = self.shared.state.lock();
        while state.loading || !state.loaded_initial {
            if state.closed {
                return Err(StorageError::Closed);
            }
            self.shared.cond.wait(&mut state);
        }
        Ok(state.last_loaded.clone())
    }

    pub fn current_version(&self) -> Version {
        self.shared.state.lock().version.clone()
    }

    /// Live tables with their level, level by level
    pub fn current_live_tables(&self) -> Vec<(usize, TableMetadata)> {
        let state = self.shared.state.lock();
        state
            .version
            .live_tables()
            .map(|(level, t)| (level, t.clone()))
            .collect()
    }

    /// Published stats of a live table
    pub fn table_stats(&self, file_num: FileNum) -> Option<TableStats> {
        let state = self.shared.state.lock();
        state.version.find(file_num).and_then(|(_, t)| t.stats)
    }

    pub fn pending_tables(&self) -> Vec<FileNum> {
        self.shared.state.lock().pending.iter().copied().collect()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.lock().loading
    }

    pub fn loaded_initial(&self) -> bool {
        self.shared.state.lock().loaded_initial
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of background passes started since open
    pub fn passes_started(&self) -> u64 {
        self.shared.state.lock().passes_started
    }

    /// Stop scheduling and wait for the running pass to finish its table
    ///
    /// Remaining pending tables are abandoned. Idempotent. Called from a
    /// listener (directly or by dropping the last handle), it only marks the
    /// collector closed; the pass stops once the listener returns.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if state.worker == Some(thread::current().id()) {
            self.shared.cond.notify_all();
            info!("table stats collector closed from its worker");
            return;
        }
        while state.loading {
            self.shared.cond.wait(&mut state);
        }
        self.shared.cond.notify_all();
        info!(pending = state.pending.len(), "table stats collector closed");
    }
}

impl Drop for TableStatsCollector {
    fn drop(&mut self) {
        self.close();
    }
}

/// Start a pass if there is runnable work and none is running
fn maybe_collect_locked(shared: &Arc<Shared>, state: &mut CollectorState) {
    if state.loading || state.disabled || state.closed {
        return;
    }
    if state.pending.is_empty() {
        if !state.loaded_initial {
            // Nothing to load: the initial load is trivially complete.
            state.loaded_initial = true;
            shared.cond.notify_all();
        }
        return;
    }
    if !state.has_runnable_work() {
        return;
    }

    let job_id = state.next_job_id;
    state.next_job_id += 1;
    state.loading = true;
    state.passes_started += 1;

    let worker = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(shared.thread_name.clone())
        .spawn(move || run_pass(worker, job_id));
    match spawned {
        Ok(handle) => state.worker = Some(handle.thread().id()),
        Err(e) => {
            warn!(job_id, error = %e, "failed to spawn table stats thread");
            state.loading = false;
            shared.cond.notify_all();
        }
    }
}

/// Drain the pending set one table at a time
fn run_pass(shared: Arc<Shared>, job_id: u64) {
    let mut state = shared.state.lock();
    debug!(job_id, pending = state.pending.len(), "table stats pass started");

    loop {
        if state.disabled || state.closed {
            debug!(job_id, "table stats pass interrupted");
            break;
        }
        let Some(file_num) = state.next_runnable() else {
            break;
        };
        let Some((_, table)) = state.version.find(file_num) else {
            state.pending.remove(&file_num);
            continue;
        };
        let table = table.clone();

        let result = MutexGuard::unlocked(&mut state, || {
            estimate_table_stats(shared.reader.as_ref(), &table, shared.cmp.as_ref())
        });

        match result {
            Ok(stats) => {
                if state.version.install_stats(file_num, stats) {
                    let level = state.version.find(file_num).map(|(l, _)| l).unwrap_or(0);
                    debug!(job_id, file_num, level, "loaded table stats");
                    state.unreported.push(LoadedTableStats {
                        file_num,
                        level,
                        stats,
                    });
                } else {
                    debug!(job_id, file_num, "table no longer live, dropping stats");
                }
                state.pending.remove(&file_num);
            }
            Err(err) => {
                warn!(job_id, file_num, error = %err, transient = err.is_transient(),
                    "failed to load table stats");
                state.failed.insert(file_num);
                let event = BackgroundError {
                    job_id,
                    file_num,
                    error: err.to_string(),
                };
                MutexGuard::unlocked(&mut state, || shared.listener.background_error(&event));
            }
        }
    }

    if state.pending.is_empty() {
        let first_drain = !state.loaded_initial;
        state.loaded_initial = true;
        if first_drain || !state.unreported.is_empty() {
            let info = TableStatsInfo {
                job_id,
                tables: std::mem::take(&mut state.unreported),
            };
            info!(job_id, tables = info.tables.len(), "table stats loaded");
            state.last_loaded = Some(info.clone());
            MutexGuard::unlocked(&mut state, || shared.listener.table_stats_loaded(&info));
        }
    }

    state.loading = false;
    state.worker = None;
    shared.cond.notify_all();
    maybe_collect_locked(&shared, &mut state);
}
