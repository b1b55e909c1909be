//! Import orchestration: read both inputs of a map and join them into unified records.
//!
//! ```text
//! <name>.shp ──► ShapefileReader ──► geometries ─┐
//!                                                ├─► RecordCorrelator ──► records
//! <name>.csv ──► AttributeReader ──► rows ───────┘
//! ```
//!
//! Every stage is created under the importer's cancellation token, so [`MapImporter::cancel`]
//! stops all of them. The attribute reader keeps only the `[primary, secondary, name]` columns,
//! and the correlator maps fields from that projected row.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

use crate::attributes::{AttributeReader, AttributeReaderConfig};
use crate::correlator::{CorrelationSummary, CorrelatorConfig, CorrelatorInputs, RecordCorrelator};
use crate::errors::{Result, ShpError};
use crate::logging::OperationTimer;
use crate::paths::PathConfig;
use crate::progress::ProgressCallback;
use crate::queue::{OrderedChannel, SharedBuffer, drain};
use crate::record::{RecordPositions, UnifiedRecord};
use crate::shapefile::{ShapefileReader, ShapefileReaderConfig};
use crate::task::{CancellationToken, Stage, TaskState, TaskStatus, WorkerCounts, merge_outcomes};
use crate::validation::validate_worker_count;

/// Configuration for every stage of an import.
#[derive(Debug, Clone, Default)]
pub struct ImportConfig {
    pub reader: ShapefileReaderConfig,
    pub attributes: AttributeReaderConfig,
    pub correlator: CorrelatorConfig,
}

impl ImportConfig {
    #[must_use]
    pub fn with_reader(mut self, reader: ShapefileReaderConfig) -> Self {
        self.reader = reader;
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: AttributeReaderConfig) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn with_correlator(mut self, correlator: CorrelatorConfig) -> Self {
        self.correlator = correlator;
        self
    }
}

/// Outcome of a finished import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub status: TaskStatus,
    /// Correlation counts; `None` if the correlator did not finish its loop (e.g., canceled).
    pub summary: Option<CorrelationSummary>,
    pub geometries_read: u64,
    pub rows_read: u64,
    pub records_imported: u64,
}

struct ImportStages {
    reader: ShapefileReader,
    attributes: AttributeReader,
    correlator: RecordCorrelator,
}

impl ImportStages {
    fn status(&self) -> TaskStatus {
        TaskStatus::combine([self.reader.status(), self.attributes.status(), self.correlator.status()])
    }
}

/// Imports one map: `<geometry_dir>/<name>.shp` joined with `<attribute_dir>/<name>.csv`.
pub struct MapImporter {
    geometry_path: PathBuf,
    attribute_path: PathBuf,
    config: ImportConfig,
    token: CancellationToken,
    records: SharedBuffer<UnifiedRecord>,
    callback: Option<ProgressCallback>,
    stages: Mutex<Option<Arc<ImportStages>>>,
}

impl MapImporter {
    /// Create an importer for the map described by `paths`.
    ///
    /// # Errors
    /// Returns `UnvalidatedPaths` if `paths` was not validated, or `InvalidParameter` for a
    /// zero split-worker count.
    pub fn new(paths: &PathConfig, config: ImportConfig) -> Result<Self> {
        paths.ensure_validated()?;
        validate_worker_count(config.attributes.split_workers, "split workers")?;
        Ok(Self {
            geometry_path: paths.geometry_path(),
            attribute_path: paths.attribute_path(),
            config,
            token: CancellationToken::new(),
            records: OrderedChannel::shared(),
            callback: None,
            stages: Mutex::new(None),
        })
    }

    /// Report correlation progress to `callback` on every imported record.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    #[must_use]
    pub fn geometry_path(&self) -> &Path {
        &self.geometry_path
    }

    #[must_use]
    pub fn attribute_path(&self) -> &Path {
        &self.attribute_path
    }

    fn current(&self) -> Option<Arc<ImportStages>> {
        self.stages.lock().clone()
    }

    /// Build and launch every stage without waiting for them.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the import was already started, or the launch error of a
    /// stage (after canceling those already launched).
    pub fn start(&self, positions: &RecordPositions) -> Result<()> {
        let mut slot = self.stages.lock();
        if slot.is_some() {
            return Err(ShpError::InvalidParameter {
                parameter: "importer".to_string(),
                reason: "import was already started".to_string(),
            });
        }

        let reader = ShapefileReader::new(&self.geometry_path, self.config.reader.clone(), &self.token);
        let attributes = AttributeReader::new(
            &self.attribute_path,
            positions.columns(),
            &self.config.attributes,
            &self.token,
        );
        let inputs = CorrelatorInputs {
            geometries: reader.records(),
            rows: attributes.rows(),
            geometry_state: reader.state(),
            row_state: attributes.state(),
            expected: Arc::clone(attributes.read_progress()),
        };
        let correlator = RecordCorrelator::new(
            inputs,
            RecordPositions::projected(),
            Arc::clone(&self.records),
            self.config.correlator.clone(),
            &self.token,
        );
        if let Some(callback) = &self.callback {
            correlator.progress().set_callback(Arc::clone(callback));
        }

        let stages = Arc::new(ImportStages { reader, attributes, correlator });
        *slot = Some(Arc::clone(&stages));
        drop(slot);

        info!(
            "Importing {} with {}",
            self.geometry_path.display(),
            self.attribute_path.display()
        );
        let launched = stages
            .reader
            .start()
            .and_then(|()| stages.attributes.start())
            .and_then(|()| stages.correlator.start());
        if launched.is_err() {
            self.token.cancel();
        }
        launched
    }

    /// Wait for every stage and merge their outcomes.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the import was never started, or the failure(s) of the
    /// stages that faulted.
    pub fn wait(&self) -> Result<ImportReport> {
        let stages = self.current().ok_or_else(|| ShpError::InvalidParameter {
            parameter: "importer".to_string(),
            reason: "import was never started".to_string(),
        })?;
        let status = merge_outcomes(
            "importer",
            [stages.reader.join(), stages.attributes.join(), stages.correlator.join()],
        )?;
        Ok(ImportReport {
            status,
            summary: stages.correlator.summary(),
            geometries_read: stages.reader.records_read(),
            rows_read: stages.attributes.lines_converted(),
            records_imported: stages.correlator.records_imported(),
        })
    }

    /// Import every record, blocking until the import has finished.
    ///
    /// # Errors
    /// See [`MapImporter::start`] and [`MapImporter::wait`].
    pub fn run(&self, positions: &RecordPositions) -> Result<ImportReport> {
        let timer = OperationTimer::new("Importing records");
        self.start(positions)?;
        let report = self.wait()?;
        timer.log_completion(report.records_imported);
        Ok(report)
    }

    /// Cancel every stage. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The ordered queue of imported records.
    #[must_use]
    pub fn records(&self) -> SharedBuffer<UnifiedRecord> {
        Arc::clone(&self.records)
    }

    /// State of the stage feeding [`MapImporter::records`], once the import has started.
    #[must_use]
    pub fn records_state(&self) -> Option<TaskState> {
        self.current().map(|s| s.correlator.state())
    }

    /// Remove and return every record imported so far.
    #[must_use]
    pub fn take_records(&self) -> Vec<UnifiedRecord> {
        drain(self.records.as_ref())
    }

    #[must_use]
    pub fn records_imported(&self) -> u64 {
        self.current().map_or(0, |s| s.correlator.records_imported())
    }

    /// Expected record count, known once the attribute file has been pre-scanned.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.current().map_or(0, |s| s.correlator.total_records())
    }

    /// Combined status of every stage (`Created` before the import starts).
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.current().map_or(TaskStatus::Created, |s| s.status())
    }

    /// Status of each stage by name: geometry reader, attribute reader, correlator.
    ///
    /// Empty before the import starts.
    #[must_use]
    pub fn stage_statuses(&self) -> Vec<(&'static str, TaskStatus)> {
        self.current().map_or_else(Vec::new, |s| {
            vec![
                ("geometry-reader", s.reader.status()),
                ("attribute-reader", s.attributes.status()),
                ("correlator", s.correlator.status()),
            ]
        })
    }

    /// Worker counts summed over every stage.
    #[must_use]
    pub fn worker_counts(&self) -> WorkerCounts {
        self.current().map_or_else(WorkerCounts::default, |s| {
            s.reader.worker_counts() + s.attributes.worker_counts() + s.correlator.worker_counts()
        })
    }
}
