//! Record types flowing through the import pipeline.
//!
//! - [`GeometryRecord`]: one decoded shape from the binary geometry file
//! - [`AttributeRow`]: one column-filtered line of the attribute file
//! - [`UnifiedRecord`]: a geometry joined with its attribute row, and the unit of persistence

use geo::{Coord, LineString, Simplify};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ShpError};

/// File extension of persisted record files.
pub const RECORD_FILE_EXTENSION: &str = "geomap";

/// A point in map space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One decoded shape.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub record_number: i32,
    pub points: Vec<Point3>,
}

/// The retained cells of one attribute-file line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow(pub Vec<String>);

impl AttributeRow {
    /// The cell at `index`.
    ///
    /// # Errors
    /// Returns `ColumnOutOfRange` if the row has no such cell.
    pub fn cell(&self, index: usize) -> Result<&str> {
        self.0
            .get(index)
            .map(String::as_str)
            .ok_or(ShpError::ColumnOutOfRange { index, columns: self.0.len() })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which attribute cell carries which field of a [`UnifiedRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPositions {
    pub primary_id_index: usize,
    pub secondary_id_index: usize,
    pub name_index: usize,
}

impl RecordPositions {
    #[must_use]
    pub const fn new(primary_id_index: usize, secondary_id_index: usize, name_index: usize) -> Self {
        Self { primary_id_index, secondary_id_index, name_index }
    }

    /// Source-file columns to retain, in `[primary, secondary, name]` order.
    #[must_use]
    pub fn columns(&self) -> Vec<usize> {
        vec![self.primary_id_index, self.secondary_id_index, self.name_index]
    }

    /// Positions within a row that was projected onto [`RecordPositions::columns`].
    #[must_use]
    pub const fn projected() -> Self {
        Self::new(0, 1, 2)
    }
}

/// A geometry joined with its attribute fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedRecord {
    pub record_number: i32,
    pub points: Vec<Point3>,
    pub primary_id: i32,
    pub secondary_id: i32,
    pub name: String,
}

/// Lenient integer parse: surrounding whitespace is ignored, anything unparseable is 0.
fn parse_id(cell: &str) -> i32 {
    cell.trim().parse().unwrap_or_default()
}

impl UnifiedRecord {
    /// Join a geometry with the row chosen for it.
    ///
    /// The ids parse leniently (see [`UnifiedRecord::primary_id`]); the name is taken verbatim.
    ///
    /// # Errors
    /// Returns `ColumnOutOfRange` if `row` lacks a cell named by `positions`.
    pub fn from_parts(
        geometry: GeometryRecord,
        row: &AttributeRow,
        positions: &RecordPositions,
    ) -> Result<Self> {
        Ok(Self {
            record_number: geometry.record_number,
            points: geometry.points,
            primary_id: parse_id(row.cell(positions.primary_id_index)?),
            secondary_id: parse_id(row.cell(positions.secondary_id_index)?),
            name: row.cell(positions.name_index)?.to_string(),
        })
    }

    /// Serialize to one self-contained persisted line (no trailing newline).
    ///
    /// # Errors
    /// Returns `MalformedRecord` if a coordinate is NaN or infinite (it could not be parsed
    /// back), or if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        if let Some(point) = self.points.iter().find(|p| !p.is_finite()) {
            return Err(ShpError::MalformedRecord(serde::ser::Error::custom(format!(
                "record {} has a non-finite coordinate ({}, {}, {})",
                self.record_number, point.x, point.y, point.z
            ))));
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one persisted line.
    ///
    /// # Errors
    /// Returns `MalformedRecord` if the line is not a valid record.
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Thin `points` with Ramer-Douglas-Peucker in the x/y plane.
    ///
    /// Records with fewer than three points are returned unchanged. The z of the first point
    /// is carried onto every kept point.
    #[must_use]
    pub fn simplified(mut self, tolerance: f64) -> Self {
        if self.points.len() < 3 {
            return self;
        }
        let z = self.points[0].z;
        let line: LineString<f64> =
            self.points.iter().map(|p| Coord { x: p.x, y: p.y }).collect::<Vec<_>>().into();
        self.points = line.simplify(&tolerance).0.into_iter().map(|c| Point3::new(c.x, c.y, z)).collect();
        self
    }
}
