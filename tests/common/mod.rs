#![allow(dead_code)]

use ahash::AHashSet;
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tablestats::storage::BoxedIter;
use tablestats::{
    BytewiseComparer, FileNum, InMemoryTableReader, PointEntry, Result, Span, StorageError,
    TableContents, TableMetadata, TableReader,
};

/// Blocks estimations of selected tables until released
struct Gate {
    files: AHashSet<FileNum>,
    entered: Sender<FileNum>,
    release: Receiver<()>,
}

/// Handle held by the test to observe and release gated estimations
pub struct GateHandle {
    pub entered: Receiver<FileNum>,
    release: Sender<()>,
}

impl GateHandle {
    /// Wait for the worker to start estimating a gated table
    pub fn wait_entered(&self) -> FileNum {
        self.entered
            .recv_timeout(Duration::from_secs(10))
            .expect("worker never reached the gate")
    }

    pub fn release(&self) {
        self.release.send(()).expect("gate dropped");
    }
}

/// In-memory reader with failure injection, gating and concurrency tracking
#[derive(Default)]
pub struct TestReader {
    pub inner: InMemoryTableReader,
    gate: Mutex<Option<Gate>>,
    failing: Mutex<AHashSet<FileNum>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    estimations: AtomicUsize,
}

impl TestReader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gate(&self, files: &[FileNum]) -> GateHandle {
        let (entered_tx, entered_rx) = bounded(16);
        let (release_tx, release_rx) = bounded(16);
        *self.gate.lock() = Some(Gate {
            files: files.iter().copied().collect(),
            entered: entered_tx,
            release: release_rx,
        });
        GateHandle {
            entered: entered_rx,
            release: release_tx,
        }
    }

    pub fn fail(&self, file_num: FileNum) {
        self.failing.lock().insert(file_num);
    }

    pub fn heal(&self, file_num: FileNum) {
        self.failing.lock().remove(&file_num);
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn estimations(&self) -> usize {
        self.estimations.load(Ordering::SeqCst)
    }

    fn enter(&self, file_num: FileNum) -> Result<()> {
        self.estimations.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let waiter = {
            let gate = self.gate.lock();
            gate.as_ref()
                .filter(|g| g.files.contains(&file_num))
                .map(|g| (g.entered.clone(), g.release.clone()))
        };
        match waiter {
            Some((entered, release)) => {
                let _ = entered.send(file_num);
                let _ = release.recv_timeout(Duration::from_secs(10));
            }
            None => std::thread::sleep(Duration::from_millis(1)),
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.failing.lock().contains(&file_num) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected read failure for table {}", file_num),
            )));
        }
        Ok(())
    }
}

impl TableReader for TestReader {
    fn point_iter(&self, file_num: FileNum) -> Result<BoxedIter<'_, PointEntry>> {
        self.inner.point_iter(file_num)
    }

    // The estimator opens fragments first, so this is where an estimation starts.
    fn range_del_fragments(&self, file_num: FileNum) -> Result<BoxedIter<'_, Span>> {
        self.enter(file_num)?;
        self.inner.range_del_fragments(file_num)
    }
}

/// Store a table and return its metadata (size = raw size)
pub fn add_table(
    reader: &TestReader,
    file_num: FileNum,
    points: Vec<PointEntry>,
    spans: Vec<Span>,
) -> TableMetadata {
    let contents = TableContents::new(points, spans, &BytewiseComparer);
    let size = contents.raw_size();
    let smallest = contents
        .points
        .iter()
        .map(|p| p.key.clone())
        .chain(contents.range_dels.iter().map(|s| s.start.clone()))
        .min()
        .unwrap_or_default();
    let largest = contents
        .points
        .iter()
        .map(|p| p.key.clone())
        .chain(contents.range_dels.iter().map(|s| s.end.clone()))
        .max()
        .unwrap_or_default();
    reader.inner.insert_table(file_num, contents);
    TableMetadata::new(file_num, smallest, largest, size)
}

/// A small table with one set, one deletion and one range deletion
pub fn simple_table(reader: &TestReader, file_num: FileNum) -> TableMetadata {
    add_table(
        reader,
        file_num,
        vec![PointEntry::set("b", 1, 10), PointEntry::delete("c", 2)],
        vec![Span::new("a", "d", &[5])],
    )
}

/// Spin until the collector is idle, for states where no waiter would return
pub fn wait_idle(collector: &tablestats::TableStatsCollector) {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while collector.is_loading() {
        assert!(std::time::Instant::now() < deadline, "collector never went idle");
        std::thread::yield_now();
    }
}
