//! Reload persisted records.
//!
//! ```text
//! <name>.geomap ──► LineProducer ──► UnorderedBag<String> ──► ConsumerPool(deserialize) ──► UnorderedBag<UnifiedRecord>
//! ```
//!
//! Records come back in no particular order; only the set of records matches what was exported.
//! Every line must hold one record, so a blank line faults the load.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::consumer::{ConsumerConfig, ConsumerPool, Operation};
use crate::errors::Result;
use crate::logging::OperationTimer;
use crate::producer::LineProducer;
use crate::queue::{SharedBuffer, UnorderedBag, drain};
use crate::record::UnifiedRecord;
use crate::task::{CancellationToken, Stage, StageControl, TaskStatus, WorkerCounts, merge_outcomes};
use crate::validation::{validate_file_exists, validate_worker_count};

/// Configuration for [`MapLoader`].
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Threads for the whole load: one reads lines, the rest deserialize (at least one).
    pub threads: usize,
    pub poll_interval: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self { threads: 2, poll_interval: Duration::from_millis(10) }
    }
}

impl LoadConfig {
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Workers deserializing lines.
    #[must_use]
    pub fn deserialize_workers(&self) -> usize {
        self.threads.saturating_sub(1).max(1)
    }
}

/// Composite stage reloading a persisted record file.
pub struct MapLoader {
    token: CancellationToken,
    producer: LineProducer,
    deserializer: ConsumerPool<String, UnifiedRecord>,
}

impl MapLoader {
    /// Create a loader for `path` under a token derived from `parent`.
    ///
    /// # Errors
    /// Returns `InvalidPath` if `path` is not an existing file, or `InvalidParameter` for a
    /// zero thread count.
    pub fn new(path: impl Into<PathBuf>, config: &LoadConfig, parent: &CancellationToken) -> Result<Self> {
        let path = path.into();
        validate_file_exists(&path, "record file")?;
        validate_worker_count(config.threads, "threads")?;

        let token = parent.child();
        let lines: SharedBuffer<String> = UnorderedBag::shared();
        let producer = LineProducer::new("record-reader", path, false, Arc::clone(&lines), &token);
        let deserialize: Operation<String, UnifiedRecord> =
            Arc::new(|line: String| UnifiedRecord::from_line(&line));
        let consumer = ConsumerConfig::new(config.deserialize_workers())
            .with_poll_interval(config.poll_interval)
            .with_wait_for_items(true);
        let deserializer = ConsumerPool::new(
            "record-deserializer",
            lines,
            UnorderedBag::shared(),
            deserialize,
            &consumer,
            &token,
        )
        .with_monitored(vec![producer.state()]);
        Ok(Self { token, producer, deserializer })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.producer.path()
    }

    /// Load every record, blocking until the file has been read.
    ///
    /// # Errors
    /// Returns the failure of the read or deserialize stage.
    pub fn load(&self) -> Result<TaskStatus> {
        let timer = OperationTimer::new("Loading records");
        let status = self.run()?;
        timer.log_completion(self.lines_converted());
        Ok(status)
    }

    /// The collection of reloaded records.
    #[must_use]
    pub fn records(&self) -> SharedBuffer<UnifiedRecord> {
        self.deserializer.output()
    }

    /// Remove and return every record loaded so far.
    #[must_use]
    pub fn take_records(&self) -> Vec<UnifiedRecord> {
        drain(self.deserializer.output().as_ref())
    }

    #[must_use]
    pub fn lines_read(&self) -> u64 {
        self.producer.items_produced()
    }

    #[must_use]
    pub fn lines_converted(&self) -> u64 {
        self.deserializer.items_consumed()
    }
}

impl Stage for MapLoader {
    fn control(&self) -> &StageControl {
        self.deserializer.control()
    }

    fn start(&self) -> Result<()> {
        self.producer.start()?;
        self.deserializer.start()
    }

    fn join(&self) -> Result<TaskStatus> {
        let read = self.producer.join();
        let deserialized = self.deserializer.join();
        merge_outcomes("loader", [read, deserialized])
    }

    fn cancel(&self) {
        self.token.cancel();
    }

    fn status(&self) -> TaskStatus {
        TaskStatus::combine([self.producer.status(), self.deserializer.status()])
    }

    fn worker_counts(&self) -> WorkerCounts {
        self.producer.worker_counts() + self.deserializer.worker_counts()
    }
}
