//! Custom error types for shpjoin operations.
//!
//! Library functions return [`Result`], whose error type is [`ShpError`]. Worker bodies that
//! run inside a stage return [`WorkResult`] instead, which separates cooperative cancellation
//! ([`Interrupt::Cancelled`]) from genuine failures ([`Interrupt::Failed`]) so that the stage
//! boundary can classify the outcome without inspecting error messages.

use std::io;

use thiserror::Error;

/// Result type alias for shpjoin operations
pub type Result<T> = std::result::Result<T, ShpError>;

/// Result type returned by stage worker bodies.
pub type WorkResult<T = ()> = std::result::Result<T, Interrupt>;

/// Error type for shpjoin operations
#[derive(Error, Debug)]
pub enum ShpError {
    /// A pipeline component was constructed from a `PathConfig` that never passed validation
    #[error("Paths for '{file_name}' have not been validated; call PathConfig::validate first")]
    UnvalidatedPaths {
        /// The base file name of the unvalidated configuration
        file_name: String,
    },

    /// A directory or file path failed validation
    #[error("Invalid {description} '{path}': {reason}")]
    InvalidPath {
        /// What the path is used for (e.g., "geometry directory")
        description: String,
        /// The offending path
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// The fixed-size shapefile header could not be read
    #[error("Invalid shapefile header in '{path}': {reason}")]
    InvalidHeader {
        /// Path to the shapefile
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// A record declared a shape type the reader cannot decode
    #[error("ShapeType {shape_type} is not supported (record {record_number})")]
    UnsupportedShapeType {
        /// The raw shape type code
        shape_type: i32,
        /// The record number carrying the unsupported type
        record_number: i32,
    },

    /// More undecodable records were found than the configured tolerance allows
    #[error(
        "Shapefile '{path}' is corrupted: {corrupt_records} undecodable records (tolerance {tolerance})"
    )]
    CorruptedInput {
        /// Path to the shapefile
        path: String,
        /// Number of undecodable records seen so far
        corrupt_records: u64,
        /// Number of undecodable records that are tolerated
        tolerance: u64,
    },

    /// A stage made no progress within its stall window
    #[error("{stage} stalled: no progress in the last {timeout_ms}ms")]
    Stalled {
        /// The stalled stage
        stage: String,
        /// The stall window in milliseconds
        timeout_ms: u64,
    },

    /// A monitored upstream stage faulted before this stage could make use of it
    #[error("Upstream stage '{stage}' faulted")]
    UpstreamFaulted {
        /// The upstream stage name
        stage: String,
    },

    /// An attribute row had fewer cells than a configured column index requires
    #[error("Column {index} is out of range for a row with {columns} columns")]
    ColumnOutOfRange {
        /// The requested column index
        index: usize,
        /// Number of cells in the row
        columns: usize,
    },

    /// A persisted line could not be converted to or from a record
    #[error("Malformed persisted record: {0}")]
    MalformedRecord(#[from] serde_json::Error),

    /// I/O failure
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A worker thread panicked
    #[error("Worker '{worker}' panicked: {message}")]
    WorkerPanic {
        /// The worker label
        worker: String,
        /// The extracted panic message
        message: String,
    },

    /// One or more workers of a stage failed
    #[error("Stage '{stage}' faulted with {count} error(s)", count = .errors.len())]
    Faulted {
        /// The stage name
        stage: String,
        /// Every failure reported by the stage's workers
        errors: Vec<ShpError>,
    },
}

impl ShpError {
    /// Flatten nested `Faulted` aggregates into their leaf errors.
    #[must_use]
    pub fn leaves(&self) -> Vec<&ShpError> {
        match self {
            ShpError::Faulted { errors, .. } => errors.iter().flat_map(ShpError::leaves).collect(),
            other => vec![other],
        }
    }
}

/// Why a worker body stopped before running to completion.
#[derive(Debug)]
pub enum Interrupt {
    /// The stage's cancellation token was raised; an expected outcome.
    Cancelled,
    /// The worker failed.
    Failed(ShpError),
}

impl Interrupt {
    /// Returns true if this interrupt is a cooperative cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Interrupt::Cancelled)
    }
}

impl From<ShpError> for Interrupt {
    fn from(error: ShpError) -> Self {
        Interrupt::Failed(error)
    }
}

impl From<io::Error> for Interrupt {
    fn from(error: io::Error) -> Self {
        Interrupt::Failed(ShpError::Io(error))
    }
}

impl From<serde_json::Error> for Interrupt {
    fn from(error: serde_json::Error) -> Self {
        Interrupt::Failed(ShpError::MalformedRecord(error))
    }
}
