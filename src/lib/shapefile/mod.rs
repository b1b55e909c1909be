//! Binary geometry reader stage.
//!
//! [`ShapefileReader`] runs one worker that decodes the header and then every record of a
//! geometry file, pushing [`GeometryRecord`]s in file order onto an ordered buffer.
//!
//! Per-record policy:
//!
//! - clean end of stream before a record header ends the read normally
//! - end of stream inside a record is logged and also ends the read
//! - an unsupported shape type aborts the read (`Faulted`)
//! - an undecodable record is skipped; once more than `corrupt_tolerance` records have been
//!   skipped over the whole stream, the read aborts with `CorruptedInput`
//! - if no record has been produced within `stall_timeout`, the read aborts with `Stalled`
//!
//! # Module Structure
//!
//! - `codec`: header/record layout and the streaming [`ShapeDecoder`]
//! - `builder`: [`ShapefileBuilder`] for writing fixture files

mod builder;
mod codec;

pub use builder::ShapefileBuilder;
pub use codec::{
    BoundingBox, HEADER_LENGTH, MULTIPOINT_Z, POINT_Z, POLY_Z, RECORD_HEADER_LENGTH,
    RecordOutcome, ShapeDecoder, ShapeType, ShapefileHeader,
};

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::errors::{ShpError, WorkResult};
use crate::progress::StageProgress;
use crate::queue::{OrderedChannel, SharedBuffer, StageBuffer};
use crate::record::GeometryRecord;
use crate::task::{CancellationToken, Stage, StageControl};

/// Configuration for [`ShapefileReader`].
#[derive(Debug, Clone)]
pub struct ShapefileReaderConfig {
    /// Longest allowed gap between two produced records.
    pub stall_timeout: Duration,
    /// Undecodable records skipped before the read aborts.
    pub corrupt_tolerance: u64,
}

impl Default for ShapefileReaderConfig {
    fn default() -> Self {
        Self { stall_timeout: Duration::from_millis(1000), corrupt_tolerance: 1 }
    }
}

impl ShapefileReaderConfig {
    #[must_use]
    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    #[must_use]
    pub fn with_corrupt_tolerance(mut self, corrupt_tolerance: u64) -> Self {
        self.corrupt_tolerance = corrupt_tolerance;
        self
    }
}

/// Counters updated while reading.
#[derive(Clone)]
pub(crate) struct ReadCounters {
    pub records: Arc<StageProgress>,
    pub bytes: Arc<StageProgress>,
}

/// Reader stage for one geometry file.
pub struct ShapefileReader {
    path: PathBuf,
    config: ShapefileReaderConfig,
    records: SharedBuffer<GeometryRecord>,
    control: StageControl,
    counters: ReadCounters,
}

impl ShapefileReader {
    /// Create a reader for `path` whose token is a child of `parent`.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        config: ShapefileReaderConfig,
        parent: &CancellationToken,
    ) -> Self {
        let control = StageControl::new("shapefile-reader", parent);
        let counters = ReadCounters {
            records: Arc::new(StageProgress::new("Geometry records read", control.state())),
            bytes: Arc::new(StageProgress::new("Geometry bytes read", control.state()).with_log_interval(0)),
        };
        Self { path: path.into(), config, records: OrderedChannel::shared(), control, counters }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The buffer decoded records are pushed onto, in file order.
    #[must_use]
    pub fn records(&self) -> SharedBuffer<GeometryRecord> {
        Arc::clone(&self.records)
    }

    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.counters.records.done()
    }

    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.counters.bytes.done()
    }

    /// Size of the file being read, known once the worker has opened it.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.counters.bytes.total()
    }

    #[must_use]
    pub fn record_progress(&self) -> &Arc<StageProgress> {
        &self.counters.records
    }

    /// Progress by bytes; its percentage reflects how far through the file the reader is.
    #[must_use]
    pub fn byte_progress(&self) -> &Arc<StageProgress> {
        &self.counters.bytes
    }
}

impl Stage for ShapefileReader {
    fn control(&self) -> &StageControl {
        &self.control
    }

    fn start(&self) -> crate::errors::Result<()> {
        let path = self.path.clone();
        let config = self.config.clone();
        let records = Arc::clone(&self.records);
        let counters = self.counters.clone();
        self.control.launch(1, move |_, token| {
            let file = File::open(&path).map_err(|e| ShpError::InvalidPath {
                description: "geometry file".to_string(),
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            counters.bytes.set_total(file.metadata()?.len());
            info!("Reading geometry from {}", path.display());
            read_shapes(BufReader::new(file), &path, &config, records.as_ref(), &counters, token)
        })
    }
}

/// Decode every record of `source`; the body of the reader worker.
pub(crate) fn read_shapes<R: Read>(
    source: R,
    path: &Path,
    config: &ShapefileReaderConfig,
    records: &dyn StageBuffer<GeometryRecord>,
    counters: &ReadCounters,
    token: &CancellationToken,
) -> WorkResult {
    let mut decoder = ShapeDecoder::new(source);
    let header = decoder.read_header().map_err(|e| ShpError::InvalidHeader {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    debug!("Header of {}: {header:?}", path.display());
    counters.bytes.record(decoder.position());

    let mut last_record = Instant::now();
    let mut corrupt_records = 0u64;
    loop {
        if last_record.elapsed() >= config.stall_timeout {
            return Err(ShpError::Stalled {
                stage: format!("Reading {}", path.display()),
                timeout_ms: u64::try_from(config.stall_timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into());
        }
        token.check()?;

        let before = decoder.position();
        let outcome = decoder.read_record()?;
        counters.bytes.record(decoder.position() - before);

        match outcome {
            RecordOutcome::Record(record) => {
                records.push(record);
                counters.records.record(1);
                last_record = Instant::now();
            }
            RecordOutcome::EndOfStream => break,
            RecordOutcome::Truncated { record_number } => {
                match record_number {
                    Some(n) => warn!("{} ends inside record {n}; record dropped", path.display()),
                    None => warn!("{} ends inside a record header", path.display()),
                }
                break;
            }
            RecordOutcome::Corrupt { record_number, reason } => {
                corrupt_records += 1;
                warn!("Skipping undecodable record {record_number} of {}: {reason}", path.display());
                if corrupt_records > config.corrupt_tolerance {
                    return Err(ShpError::CorruptedInput {
                        path: path.display().to_string(),
                        corrupt_records,
                        tolerance: config.corrupt_tolerance,
                    }
                    .into());
                }
            }
        }
    }
    counters.records.log_final();
    Ok(())
}
