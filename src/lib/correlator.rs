//! Positional join of geometry records with attribute rows.
//!
//! The correlator pairs the n-th geometry record with the n-th attribute row. It holds at most
//! one pending item from each source; each round it tries to fill the empty side within
//! `attempt_timeout`, and emits a [`UnifiedRecord`] once both sides are held.
//!
//! The loop ends once both upstream stages are terminal and one of the sources is exhausted.
//! Reaching that point with fewer records than expected is reported in the
//! [`CorrelationSummary`] and logged as a warning, not raised as an error.
//!
//! The emitted count is not part of the exit condition. When the two files disagree in length
//! it can never reach the expected total, so waiting on it would spin forever once both
//! readers have finished. The count only chooses between the completion log and the mismatch
//! warning.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;

use crate::errors::{Result, WorkResult};
use crate::logging::format_count;
use crate::progress::StageProgress;
use crate::queue::SharedBuffer;
use crate::record::{AttributeRow, GeometryRecord, RecordPositions, UnifiedRecord};
use crate::task::{CancellationToken, Stage, StageControl, TaskState};

/// Configuration for [`RecordCorrelator`].
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// How long one round waits for a missing side.
    pub attempt_timeout: Duration,
    /// How long to wait for both upstream stages to start.
    pub start_timeout: Duration,
    /// Thin each record's points with this tolerance when set.
    pub simplify_tolerance: Option<f64>,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(10),
            start_timeout: Duration::from_millis(2000),
            simplify_tolerance: None,
        }
    }
}

impl CorrelatorConfig {
    #[must_use]
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    #[must_use]
    pub fn with_start_timeout(mut self, start_timeout: Duration) -> Self {
        self.start_timeout = start_timeout;
        self
    }

    #[must_use]
    pub fn with_simplify_tolerance(mut self, tolerance: Option<f64>) -> Self {
        self.simplify_tolerance = tolerance;
        self
    }
}

/// Counts observed when the correlator finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    pub emitted: u64,
    /// Expected record count, taken from the attribute file's data lines.
    pub expected: u64,
    /// Geometry records left without a row.
    pub leftover_geometries: u64,
    /// Rows left without a geometry record.
    pub leftover_rows: u64,
}

impl CorrelationSummary {
    /// Returns true if every expected record was emitted and nothing was left over.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.emitted == self.expected && self.leftover_geometries == 0 && self.leftover_rows == 0
    }
}

/// The two sources being joined and the upstream stages feeding them.
pub struct CorrelatorInputs {
    pub geometries: SharedBuffer<GeometryRecord>,
    pub rows: SharedBuffer<AttributeRow>,
    pub geometry_state: TaskState,
    pub row_state: TaskState,
    /// Progress whose total is the expected record count.
    pub expected: Arc<StageProgress>,
}

/// Single-worker stage joining geometry records with attribute rows.
pub struct RecordCorrelator {
    inputs: Arc<CorrelatorInputs>,
    positions: RecordPositions,
    output: SharedBuffer<UnifiedRecord>,
    config: CorrelatorConfig,
    control: StageControl,
    emitted: Arc<StageProgress>,
    summary: Arc<Mutex<Option<CorrelationSummary>>>,
}

impl RecordCorrelator {
    /// Create a correlator pushing onto `output`, whose token is a child of `parent`.
    #[must_use]
    pub fn new(
        inputs: CorrelatorInputs,
        positions: RecordPositions,
        output: SharedBuffer<UnifiedRecord>,
        config: CorrelatorConfig,
        parent: &CancellationToken,
    ) -> Self {
        let control = StageControl::new("correlator", parent);
        let emitted = Arc::new(StageProgress::new("Records imported", control.state()));
        Self {
            inputs: Arc::new(inputs),
            positions,
            output,
            config,
            control,
            emitted,
            summary: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn output(&self) -> SharedBuffer<UnifiedRecord> {
        Arc::clone(&self.output)
    }

    #[must_use]
    pub fn records_imported(&self) -> u64 {
        self.emitted.done()
    }

    /// Expected record count, known once the attribute file has been pre-scanned.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.inputs.expected.total()
    }

    #[must_use]
    pub fn progress(&self) -> &Arc<StageProgress> {
        &self.emitted
    }

    /// Counts from the finished join, `None` until the worker has exited its loop normally.
    #[must_use]
    pub fn summary(&self) -> Option<CorrelationSummary> {
        *self.summary.lock()
    }
}

impl Stage for RecordCorrelator {
    fn control(&self) -> &StageControl {
        &self.control
    }

    fn start(&self) -> Result<()> {
        let worker = CorrelatorWorker {
            inputs: Arc::clone(&self.inputs),
            positions: self.positions,
            output: Arc::clone(&self.output),
            config: self.config.clone(),
            emitted: Arc::clone(&self.emitted),
            summary: Arc::clone(&self.summary),
        };
        self.control.launch(1, move |_, token| worker.run(token))
    }
}

struct CorrelatorWorker {
    inputs: Arc<CorrelatorInputs>,
    positions: RecordPositions,
    output: SharedBuffer<UnifiedRecord>,
    config: CorrelatorConfig,
    emitted: Arc<StageProgress>,
    summary: Arc<Mutex<Option<CorrelationSummary>>>,
}

impl CorrelatorWorker {
    fn run(&self, token: &CancellationToken) -> WorkResult {
        let inputs = &self.inputs;
        inputs.geometry_state.wait_until_started(self.config.start_timeout, token)?;
        inputs.row_state.wait_until_started(self.config.start_timeout, token)?;

        let mut geometry: Option<GeometryRecord> = None;
        let mut row: Option<AttributeRow> = None;
        loop {
            token.check()?;
            let upstream_done = inputs.geometry_state.is_terminal() && inputs.row_state.is_terminal();
            if geometry.is_none() {
                geometry = inputs.geometries.pop_timeout(self.config.attempt_timeout);
            }
            if row.is_none() {
                row = inputs.rows.pop_timeout(self.config.attempt_timeout);
            }
            match (geometry.take(), row.take()) {
                (Some(g), Some(r)) => self.emit(g, &r)?,
                (g, r) => {
                    geometry = g;
                    row = r;
                    // Once upstream is done, an empty side can never be refilled.
                    let geometries_exhausted = geometry.is_none() && inputs.geometries.is_empty();
                    let rows_exhausted = row.is_none() && inputs.rows.is_empty();
                    if upstream_done && (geometries_exhausted || rows_exhausted) {
                        break;
                    }
                }
            }
        }

        let summary = CorrelationSummary {
            emitted: self.emitted.done(),
            expected: inputs.expected.total(),
            leftover_geometries: u64::from(geometry.is_some()) + inputs.geometries.len() as u64,
            leftover_rows: u64::from(row.is_some()) + inputs.rows.len() as u64,
        };
        if summary.is_complete() {
            info!("Correlated {} records", format_count(summary.emitted));
        } else {
            warn!(
                "Correlation finished incomplete: {} of {} records emitted ({} geometries and {} rows unmatched)",
                format_count(summary.emitted),
                format_count(summary.expected),
                summary.leftover_geometries,
                summary.leftover_rows
            );
        }
        *self.summary.lock() = Some(summary);
        self.emitted.log_final();
        Ok(())
    }

    fn emit(&self, geometry: GeometryRecord, row: &AttributeRow) -> WorkResult {
        let mut record = UnifiedRecord::from_parts(geometry, row, &self.positions)?;
        if let Some(tolerance) = self.config.simplify_tolerance {
            record = record.simplified(tolerance);
        }
        self.output.push(record);
        self.emitted.record(1);
        Ok(())
    }
}
