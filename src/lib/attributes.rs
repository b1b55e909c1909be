//! Delimited-text attribute reader.
//!
//! An [`AttributeReader`] chains a [`LineProducer`] and a [`ConsumerPool`]:
//!
//! ```text
//! file ──► LineProducer ──► OrderedChannel<String> ──► ConsumerPool(split) ──► OrderedChannel<AttributeRow>
//! ```
//!
//! Rows are split on a single delimiter character with no quoting or escaping, then projected
//! onto the requested columns. With one split worker the rows leave in file order; more workers
//! give no ordering guarantee, which breaks positional correlation with the geometry stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;

use crate::consumer::{ConsumerConfig, ConsumerPool, Operation};
use crate::errors::{Result, ShpError};
use crate::producer::LineProducer;
use crate::progress::StageProgress;
use crate::queue::{OrderedChannel, SharedBuffer};
use crate::record::AttributeRow;
use crate::task::{CancellationToken, Stage, StageControl, TaskStatus, WorkerCounts, merge_outcomes};

/// Configuration for [`AttributeReader`].
#[derive(Debug, Clone)]
pub struct AttributeReaderConfig {
    pub delimiter: char,
    /// Discard the first line of the file.
    pub skip_header: bool,
    /// Workers splitting lines into rows. Only a single worker preserves row order.
    pub split_workers: usize,
    pub consumer: ConsumerConfig,
}

impl Default for AttributeReaderConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            skip_header: true,
            split_workers: 1,
            consumer: ConsumerConfig::default(),
        }
    }
}

impl AttributeReaderConfig {
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_skip_header(mut self, skip_header: bool) -> Self {
        self.skip_header = skip_header;
        self
    }

    #[must_use]
    pub fn with_split_workers(mut self, split_workers: usize) -> Self {
        self.split_workers = split_workers;
        self
    }
}

/// Split `line` on `delimiter` and keep the cells at `columns`, in the order given.
///
/// # Errors
/// Returns `ColumnOutOfRange` if the line has fewer cells than a requested column needs.
///
/// # Example
/// ```
/// use shpjoin_lib::attributes::split_columns;
///
/// let row = split_columns("a,b,c", ',', &[2, 0]).unwrap();
/// assert_eq!(row.0, vec!["c", "a"]);
/// ```
pub fn split_columns(line: &str, delimiter: char, columns: &[usize]) -> Result<AttributeRow> {
    let cells: Vec<&str> = line.split(delimiter).collect();
    columns
        .iter()
        .map(|&index| {
            cells
                .get(index)
                .map(|cell| (*cell).to_string())
                .ok_or(ShpError::ColumnOutOfRange { index, columns: cells.len() })
        })
        .collect::<Result<Vec<_>>>()
        .map(AttributeRow)
}

/// Composite stage reading an attribute file into projected rows.
///
/// Its observable state is the split pool's, which only finishes once the producer has.
pub struct AttributeReader {
    token: CancellationToken,
    producer: LineProducer,
    splitter: ConsumerPool<String, AttributeRow>,
}

impl AttributeReader {
    /// Create a reader for `path` keeping `columns`, under a token derived from `parent`.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        columns: Vec<usize>,
        config: &AttributeReaderConfig,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child();
        let lines: SharedBuffer<String> = OrderedChannel::shared();
        let producer =
            LineProducer::new("attribute-producer", path, config.skip_header, Arc::clone(&lines), &token);

        if config.split_workers > 1 {
            warn!(
                "{} split workers configured: attribute rows may leave out of order and mismatch their geometries",
                config.split_workers
            );
        }
        let delimiter = config.delimiter;
        let split: Operation<String, AttributeRow> =
            Arc::new(move |line: String| split_columns(&line, delimiter, &columns));
        let consumer = ConsumerConfig { workers: config.split_workers, ..config.consumer.clone() }
            .with_wait_for_items(true);
        let splitter =
            ConsumerPool::new("attribute-splitter", lines, OrderedChannel::shared(), split, &consumer, &token)
                .with_monitored(vec![producer.state()]);

        Self { token, producer, splitter }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.producer.path()
    }

    /// The buffer rows are pushed onto.
    #[must_use]
    pub fn rows(&self) -> SharedBuffer<AttributeRow> {
        self.splitter.output()
    }

    /// Data lines in the file (pre-scanned, header excluded), 0 until the scan has finished.
    #[must_use]
    pub fn total_lines(&self) -> u64 {
        self.producer.total_items()
    }

    #[must_use]
    pub fn lines_read(&self) -> u64 {
        self.producer.items_produced()
    }

    #[must_use]
    pub fn lines_converted(&self) -> u64 {
        self.splitter.items_consumed()
    }

    /// Progress of reading lines; its total is the expected row count.
    #[must_use]
    pub fn read_progress(&self) -> &Arc<StageProgress> {
        self.producer.progress()
    }

    #[must_use]
    pub fn convert_progress(&self) -> &Arc<StageProgress> {
        self.splitter.progress()
    }

    /// Status of the line-producing stage.
    #[must_use]
    pub fn producer_status(&self) -> TaskStatus {
        self.producer.status()
    }
}

impl Stage for AttributeReader {
    fn control(&self) -> &StageControl {
        self.splitter.control()
    }

    fn start(&self) -> Result<()> {
        self.producer.start()?;
        self.splitter.start()
    }

    fn join(&self) -> Result<TaskStatus> {
        let produced = self.producer.join();
        let split = self.splitter.join();
        merge_outcomes("attribute-reader", [produced, split])
    }

    fn cancel(&self) {
        self.token.cancel();
    }

    fn status(&self) -> TaskStatus {
        TaskStatus::combine([self.producer.status(), self.splitter.status()])
    }

    fn worker_counts(&self) -> WorkerCounts {
        self.producer.worker_counts() + self.splitter.worker_counts()
    }
}
