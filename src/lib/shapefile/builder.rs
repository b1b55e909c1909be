//! Writer for geometry files, used to produce fixtures.
//!
//! # Example
//! ```
//! use shpjoin_lib::shapefile::{ShapeType, ShapefileBuilder};
//!
//! let bytes = ShapefileBuilder::new(ShapeType::Polygon)
//!     .point(1.0, 1.0)
//!     .polygon(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)])
//!     .null()
//!     .build();
//! assert_eq!(&bytes[0..4], &9994_i32.to_be_bytes());
//! ```

use std::fs;
use std::io;
use std::path::Path;

use super::codec::{BoundingBox, HEADER_LENGTH, ShapeType};

const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;

/// Accumulates records and serializes them behind a valid header.
///
/// Record numbers are assigned sequentially from 1 in the order records are added.
#[derive(Debug, Clone)]
pub struct ShapefileBuilder {
    shape_type: i32,
    bounds: Option<BoundingBox>,
    records: Vec<u8>,
    next_record_number: i32,
}

fn bounds_of(points: &[(f64, f64)]) -> Option<BoundingBox> {
    let (&(x, y), rest) = points.split_first()?;
    Some(rest.iter().fold(
        BoundingBox { x_min: x, y_min: y, x_max: x, y_max: y },
        |b, &(x, y)| BoundingBox {
            x_min: b.x_min.min(x),
            y_min: b.y_min.min(y),
            x_max: b.x_max.max(x),
            y_max: b.y_max.max(y),
        },
    ))
}

fn push_bounds(payload: &mut Vec<u8>, bounds: BoundingBox) {
    for value in [bounds.x_min, bounds.y_min, bounds.x_max, bounds.y_max] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
}

fn push_points(payload: &mut Vec<u8>, points: &[(f64, f64)]) {
    for &(x, y) in points {
        payload.extend_from_slice(&x.to_le_bytes());
        payload.extend_from_slice(&y.to_le_bytes());
    }
}

fn count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

impl ShapefileBuilder {
    /// Start a file whose header declares `shape_type`.
    #[must_use]
    pub fn new(shape_type: ShapeType) -> Self {
        Self { shape_type: shape_type.code(), bounds: None, records: Vec::new(), next_record_number: 1 }
    }

    fn include(&mut self, points: &[(f64, f64)]) {
        if let Some(bounds) = bounds_of(points) {
            self.bounds = Some(match self.bounds {
                Some(current) => BoundingBox {
                    x_min: current.x_min.min(bounds.x_min),
                    y_min: current.y_min.min(bounds.y_min),
                    x_max: current.x_max.max(bounds.x_max),
                    y_max: current.y_max.max(bounds.y_max),
                },
                None => bounds,
            });
        }
    }

    /// Append a record with an arbitrary type code and payload (after the type code).
    #[must_use]
    pub fn raw_record(mut self, shape_type: i32, payload: &[u8]) -> Self {
        let content_words = count((4 + payload.len()) / 2);
        self.records.extend_from_slice(&self.next_record_number.to_be_bytes());
        self.records.extend_from_slice(&content_words.to_be_bytes());
        self.records.extend_from_slice(&shape_type.to_le_bytes());
        self.records.extend_from_slice(payload);
        self.next_record_number += 1;
        self
    }

    #[must_use]
    pub fn null(self) -> Self {
        self.raw_record(ShapeType::Null.code(), &[])
    }

    #[must_use]
    pub fn point(mut self, x: f64, y: f64) -> Self {
        self.include(&[(x, y)]);
        let mut payload = Vec::with_capacity(16);
        push_points(&mut payload, &[(x, y)]);
        self.raw_record(ShapeType::Point.code(), &payload)
    }

    /// Append a single-part polyline.
    #[must_use]
    pub fn poly_line(self, points: &[(f64, f64)]) -> Self {
        self.poly(ShapeType::PolyLine, points)
    }

    /// Append a single-ring polygon.
    #[must_use]
    pub fn polygon(self, points: &[(f64, f64)]) -> Self {
        self.poly(ShapeType::Polygon, points)
    }

    fn poly(mut self, shape_type: ShapeType, points: &[(f64, f64)]) -> Self {
        self.include(points);
        let mut payload = Vec::with_capacity(44 + points.len() * 16);
        push_bounds(&mut payload, bounds_of(points).unwrap_or_default());
        payload.extend_from_slice(&1_i32.to_le_bytes());
        payload.extend_from_slice(&count(points.len()).to_le_bytes());
        payload.extend_from_slice(&0_i32.to_le_bytes());
        push_points(&mut payload, points);
        self.raw_record(shape_type.code(), &payload)
    }

    #[must_use]
    pub fn multipoint(mut self, points: &[(f64, f64)]) -> Self {
        self.include(points);
        let mut payload = Vec::with_capacity(36 + points.len() * 16);
        push_bounds(&mut payload, bounds_of(points).unwrap_or_default());
        payload.extend_from_slice(&count(points.len()).to_le_bytes());
        push_points(&mut payload, points);
        self.raw_record(ShapeType::Multipoint.code(), &payload)
    }

    /// Append a polygon record whose part/point counts are given verbatim and no coordinates
    /// follow. Negative counts make the record undecodable.
    #[must_use]
    pub fn corrupt_polygon(self, num_parts: i32, num_points: i32) -> Self {
        let mut payload = Vec::with_capacity(40);
        push_bounds(&mut payload, BoundingBox::default());
        payload.extend_from_slice(&num_parts.to_le_bytes());
        payload.extend_from_slice(&num_points.to_le_bytes());
        self.raw_record(ShapeType::Polygon.code(), &payload)
    }

    /// Number of records added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from(self.next_record_number - 1).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize header and records.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let total = HEADER_LENGTH as usize + self.records.len();
        let mut bytes = Vec::with_capacity(total);
        bytes.extend_from_slice(&FILE_CODE.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 20]);
        bytes.extend_from_slice(&count(total / 2).to_be_bytes());
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&self.shape_type.to_le_bytes());
        push_bounds(&mut bytes, self.bounds.unwrap_or_default());
        bytes.resize(HEADER_LENGTH as usize, 0);
        bytes.extend_from_slice(&self.records);
        bytes
    }

    /// Serialize to `path`, replacing any existing file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be written.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.build())
    }
}
