//! Persist unified records, one serialized record per line.
//!
//! ```text
//! records ──► ConsumerPool(serialize) ──► UnorderedBag<String> ──► writer ──► <output_dir>/<name>.geomap
//! ```
//!
//! The writer drains the line bag while the serializer is still running or lines remain, and
//! replaces any existing file at the export path. Lines are written in whatever order they
//! leave the bag.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use parking_lot::Mutex;

use crate::consumer::{ConsumerConfig, ConsumerPool, Operation};
use crate::errors::{Result, ShpError, WorkResult};
use crate::logging::OperationTimer;
use crate::paths::PathConfig;
use crate::progress::{ProgressCallback, StageProgress};
use crate::queue::{OrderedChannel, SharedBuffer, StageBuffer, UnorderedBag};
use crate::record::UnifiedRecord;
use crate::task::{CancellationToken, Stage, StageControl, TaskState, TaskStatus, merge_outcomes};
use crate::validation::validate_worker_count;

/// Configuration for [`MapExporter`].
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Workers serializing records.
    pub serialize_workers: usize,
    /// How long a stage blocks on an empty buffer before re-checking whether to exit.
    pub poll_interval: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { serialize_workers: 1, poll_interval: Duration::from_millis(10) }
    }
}

impl ExportConfig {
    #[must_use]
    pub fn with_serialize_workers(mut self, serialize_workers: usize) -> Self {
        self.serialize_workers = serialize_workers;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

struct ExportStages {
    serializer: ConsumerPool<UnifiedRecord, String>,
    writer: StageControl,
    written: Arc<StageProgress>,
}

/// Writes records to `<output_dir>/<name>.geomap`.
pub struct MapExporter {
    path: PathBuf,
    config: ExportConfig,
    token: CancellationToken,
    callback: Option<ProgressCallback>,
    stages: Mutex<Option<Arc<ExportStages>>>,
}

impl MapExporter {
    /// Create an exporter for the map described by `paths`.
    ///
    /// # Errors
    /// Returns `UnvalidatedPaths` if `paths` was not validated, or `InvalidParameter` for a
    /// zero serialize-worker count.
    pub fn new(paths: &PathConfig, config: ExportConfig) -> Result<Self> {
        paths.ensure_validated()?;
        validate_worker_count(config.serialize_workers, "serialize workers")?;
        Ok(Self {
            path: paths.export_path(),
            config,
            token: CancellationToken::new(),
            callback: None,
            stages: Mutex::new(None),
        })
    }

    /// Report write progress to `callback` on every written line.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    #[must_use]
    pub fn export_path(&self) -> &Path {
        &self.path
    }

    fn current(&self) -> Option<Arc<ExportStages>> {
        self.stages.lock().clone()
    }

    /// Launch the serialize and write stages over `records` without waiting for them.
    ///
    /// With an `upstream` state, the serializer keeps waiting for records until that stage is
    /// terminal; without one it stops once `records` is empty.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the export was already started, or a stage launch error.
    pub fn start(&self, records: SharedBuffer<UnifiedRecord>, upstream: Option<TaskState>) -> Result<()> {
        let mut slot = self.stages.lock();
        if slot.is_some() {
            return Err(ShpError::InvalidParameter {
                parameter: "exporter".to_string(),
                reason: "export was already started".to_string(),
            });
        }

        let expected = if upstream.is_none() { Some(records.len() as u64) } else { None };
        let serialize: Operation<UnifiedRecord, String> =
            Arc::new(|record: UnifiedRecord| record.to_line());
        let consumer = ConsumerConfig::new(self.config.serialize_workers)
            .with_poll_interval(self.config.poll_interval)
            .with_wait_for_items(upstream.is_some());
        let serializer = ConsumerPool::new(
            "record-serializer",
            records,
            UnorderedBag::shared(),
            serialize,
            &consumer,
            &self.token,
        )
        .with_monitored(upstream.into_iter().collect());
        let writer = StageControl::new("record-writer", &self.token);
        let written = Arc::new(StageProgress::new("Records written", writer.state()));
        if let Some(expected) = expected {
            serializer.progress().set_total(expected);
            written.set_total(expected);
        }
        if let Some(callback) = &self.callback {
            written.set_callback(Arc::clone(callback));
        }

        let stages = Arc::new(ExportStages { serializer, writer, written });
        *slot = Some(Arc::clone(&stages));
        drop(slot);

        info!("Exporting records to {}", self.path.display());
        stages.serializer.start()?;
        let lines = stages.serializer.output();
        let serializer = stages.serializer.state();
        let written = Arc::clone(&stages.written);
        let path = self.path.clone();
        let poll_interval = self.config.poll_interval;
        let launched = stages.writer.launch(1, move |_, token| {
            write_lines(&path, lines.as_ref(), &serializer, &written, poll_interval, token)
        });
        if launched.is_err() {
            self.token.cancel();
        }
        launched
    }

    /// Wait for both stages and merge their outcomes.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the export was never started, or the stage failure(s).
    pub fn wait(&self) -> Result<TaskStatus> {
        let stages = self.current().ok_or_else(|| ShpError::InvalidParameter {
            parameter: "exporter".to_string(),
            reason: "export was never started".to_string(),
        })?;
        merge_outcomes("exporter", [stages.serializer.join(), stages.writer.join()])
    }

    /// Export every record in `records`, blocking until the file is written.
    ///
    /// # Errors
    /// See [`MapExporter::start`] and [`MapExporter::wait`].
    pub fn export(&self, records: SharedBuffer<UnifiedRecord>) -> Result<TaskStatus> {
        let timer = OperationTimer::new("Exporting records");
        self.start(records, None)?;
        let status = self.wait()?;
        timer.log_completion(self.records_written());
        Ok(status)
    }

    /// Export an in-memory collection of records.
    ///
    /// # Errors
    /// See [`MapExporter::export`].
    pub fn export_records(&self, records: Vec<UnifiedRecord>) -> Result<TaskStatus> {
        let queue: SharedBuffer<UnifiedRecord> = OrderedChannel::shared();
        for record in records {
            queue.push(record);
        }
        self.export(queue)
    }

    /// Cancel both stages. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn records_serialized(&self) -> u64 {
        self.current().map_or(0, |s| s.serializer.items_consumed())
    }

    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.current().map_or(0, |s| s.written.done())
    }
}

fn write_lines(
    path: &Path,
    lines: &dyn StageBuffer<String>,
    serializer: &TaskState,
    written: &StageProgress,
    poll_interval: Duration,
    token: &CancellationToken,
) -> WorkResult {
    let file = File::create(path).map_err(|e| ShpError::InvalidPath {
        description: "export file".to_string(),
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut out = BufWriter::new(file);
    loop {
        token.check()?;
        let serializing = !serializer.is_terminal();
        match lines.pop_timeout(poll_interval) {
            Some(line) => {
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
                written.record(1);
            }
            None if !serializing && lines.is_empty() => break,
            None => {}
        }
    }
    out.flush()?;
    written.log_final();
    Ok(())
}
