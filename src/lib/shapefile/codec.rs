//! Binary layout of the geometry file.
//!
//! ```text
//! header (100 bytes)
//!   0..28   7 × i32 BE   file code, 5 unused, file length (16-bit words)
//!   28..36  2 × i32 LE   version, shape type
//!   36..68  4 × f64 LE   bounding box (x min, y min, x max, y max)
//!   68..100              z/m ranges, ignored
//! record
//!   i32 BE record number, i32 BE content length (16-bit words), i32 LE shape type, payload
//! ```
//!
//! Payloads, all little-endian:
//!
//! | type | code | payload |
//! |---|---|---|
//! | Null | 0 | none |
//! | Point | 1 | x, y |
//! | PolyLine | 3 | bbox, parts: i32, points: i32, parts × i32, points × (x, y) |
//! | Polygon | 5 | same as PolyLine |
//! | Multipoint | 8 | bbox, points: i32, points × (x, y) |
//!
//! The declared content length does not bound decoding; each type consumes exactly its own
//! layout. It is used only to step over a record that cannot be decoded.

use std::fmt;
use std::io::{self, ErrorKind, Read};

use crate::errors::{Result, ShpError};
use crate::record::{GeometryRecord, Point3};

/// Size of the fixed file header.
pub const HEADER_LENGTH: u64 = 100;

/// Size of a record header (record number and content length).
pub const RECORD_HEADER_LENGTH: u64 = 8;

/// z assigned to points decoded from a `Point` record.
pub const POINT_Z: f64 = 3.0;

/// z assigned to points decoded from `PolyLine` and `Polygon` records.
pub const POLY_Z: f64 = 1.0;

/// z assigned to points decoded from a `Multipoint` record.
pub const MULTIPOINT_Z: f64 = 4.0;

/// Upper bound on up-front allocation for a declared point count.
const MAX_PREALLOCATED_POINTS: usize = 4096;

/// Shape types the decoder supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Null,
    Point,
    PolyLine,
    Polygon,
    Multipoint,
}

impl ShapeType {
    /// Map a type code to a supported shape type.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ShapeType::Null),
            1 => Some(ShapeType::Point),
            3 => Some(ShapeType::PolyLine),
            5 => Some(ShapeType::Polygon),
            8 => Some(ShapeType::Multipoint),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            ShapeType::Null => 0,
            ShapeType::Point => 1,
            ShapeType::PolyLine => 3,
            ShapeType::Polygon => 5,
            ShapeType::Multipoint => 8,
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeType::Null => "Null",
            ShapeType::Point => "Point",
            ShapeType::PolyLine => "PolyLine",
            ShapeType::Polygon => "Polygon",
            ShapeType::Multipoint => "Multipoint",
        };
        f.write_str(name)
    }
}

/// Axis-aligned bounds as stored in the file.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

/// File header values. Informational only; nothing here is validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapefileHeader {
    pub file_code: i32,
    /// File length in 16-bit words.
    pub file_length: i32,
    pub version: i32,
    /// Raw shape type code declared for the whole file.
    pub shape_type: i32,
    pub bounding_box: BoundingBox,
}

fn i32_be(bytes: &[u8]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn f64_le(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    f64::from_le_bytes(buf)
}

impl ShapefileHeader {
    /// Decode the 100 header bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; HEADER_LENGTH as usize]) -> Self {
        Self {
            file_code: i32_be(&bytes[0..4]),
            file_length: i32_be(&bytes[24..28]),
            version: i32_le(&bytes[28..32]),
            shape_type: i32_le(&bytes[32..36]),
            bounding_box: BoundingBox {
                x_min: f64_le(&bytes[36..44]),
                y_min: f64_le(&bytes[44..52]),
                x_max: f64_le(&bytes[52..60]),
                y_max: f64_le(&bytes[60..68]),
            },
        }
    }
}

/// Result of attempting to decode one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// A decoded record.
    Record(GeometryRecord),
    /// The stream ended cleanly before another record header.
    EndOfStream,
    /// The stream ended inside a record.
    Truncated { record_number: Option<i32> },
    /// The record could not be decoded and its remaining declared content was skipped.
    Corrupt { record_number: i32, reason: String },
}

/// Sequential decoder over a geometry byte stream.
///
/// Tracks the number of bytes consumed so callers can report progress.
pub struct ShapeDecoder<R> {
    reader: R,
    position: u64,
}

impl<R: Read> ShapeDecoder<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self { reader, position: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.reader.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn i32_le(&mut self) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn f64_le(&mut self) -> io::Result<f64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    fn skip(&mut self, count: u64) -> io::Result<u64> {
        let skipped = io::copy(&mut (&mut self.reader).take(count), &mut io::sink())?;
        self.position += skipped;
        Ok(skipped)
    }

    fn xy(&mut self, z: f64) -> io::Result<Point3> {
        let x = self.f64_le()?;
        let y = self.f64_le()?;
        Ok(Point3::new(x, y, z))
    }

    /// Read the fixed 100-byte header.
    ///
    /// # Errors
    /// Returns an I/O error if fewer than 100 bytes are available.
    pub fn read_header(&mut self) -> io::Result<ShapefileHeader> {
        let mut buf = [0u8; HEADER_LENGTH as usize];
        self.fill(&mut buf)?;
        Ok(ShapefileHeader::from_bytes(&buf))
    }

    /// Decode the next record.
    ///
    /// # Errors
    /// - `UnsupportedShapeType` for a type code outside 0, 1, 3, 5, 8
    /// - `Io` for read failures other than end of stream
    pub fn read_record(&mut self) -> Result<RecordOutcome> {
        let mut header = [0u8; RECORD_HEADER_LENGTH as usize];
        let first = match self.reader.read(&mut header) {
            Ok(0) => return Ok(RecordOutcome::EndOfStream),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => 0,
            Err(e) => return Err(e.into()),
        };
        self.position += first as u64;
        match self.fill(&mut header[first..]) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Ok(RecordOutcome::Truncated { record_number: None });
            }
            Err(e) => return Err(e.into()),
        }
        let record_number = i32_be(&header[0..4]);
        let content_length = i32_be(&header[4..8]);
        let content_start = self.position;

        match self.read_payload(record_number) {
            Ok(Ok(points)) => Ok(RecordOutcome::Record(GeometryRecord { record_number, points })),
            Ok(Err(reason)) => {
                let declared = u64::try_from(content_length).unwrap_or(0) * 2;
                let consumed = self.position - content_start;
                match self.skip(declared.saturating_sub(consumed)) {
                    Ok(_) => Ok(RecordOutcome::Corrupt { record_number, reason }),
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        Ok(RecordOutcome::Truncated { record_number: Some(record_number) })
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(ShpError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                Ok(RecordOutcome::Truncated { record_number: Some(record_number) })
            }
            Err(e) => Err(e),
        }
    }

    /// Decode a payload; the inner `Err` describes a record that is present but undecodable.
    fn read_payload(&mut self, record_number: i32) -> Result<std::result::Result<Vec<Point3>, String>> {
        let code = self.i32_le()?;
        let shape_type = ShapeType::from_code(code)
            .ok_or(ShpError::UnsupportedShapeType { shape_type: code, record_number })?;
        let points = match shape_type {
            ShapeType::Null => Vec::new(),
            ShapeType::Point => vec![self.xy(POINT_Z)?],
            ShapeType::PolyLine | ShapeType::Polygon => {
                self.skip_bounding_box()?;
                let num_parts = self.i32_le()?;
                let num_points = self.i32_le()?;
                let (Ok(num_parts), Ok(num_points)) =
                    (u64::try_from(num_parts), usize::try_from(num_points))
                else {
                    return Ok(Err(format!(
                        "{shape_type} declares {num_parts} parts and {num_points} points"
                    )));
                };
                self.skip_exact(num_parts * 4)?;
                self.read_deduplicated(num_points)?
            }
            ShapeType::Multipoint => {
                self.skip_bounding_box()?;
                let num_points = self.i32_le()?;
                let Ok(num_points) = usize::try_from(num_points) else {
                    return Ok(Err(format!("{shape_type} declares {num_points} points")));
                };
                let mut points = Vec::with_capacity(num_points.min(MAX_PREALLOCATED_POINTS));
                for _ in 0..num_points {
                    points.push(self.xy(MULTIPOINT_Z)?);
                }
                points
            }
        };
        Ok(Ok(points))
    }

    fn skip_bounding_box(&mut self) -> io::Result<()> {
        self.skip_exact(32)
    }

    fn skip_exact(&mut self, count: u64) -> io::Result<()> {
        if self.skip(count)? < count {
            return Err(io::Error::from(ErrorKind::UnexpectedEof));
        }
        Ok(())
    }

    /// Read `count` points, dropping any point equal to the one kept before it.
    fn read_deduplicated(&mut self, count: usize) -> io::Result<Vec<Point3>> {
        let mut points: Vec<Point3> = Vec::with_capacity(count.min(MAX_PREALLOCATED_POINTS));
        for _ in 0..count {
            let point = self.xy(POLY_Z)?;
            if points.last() != Some(&point) {
                points.push(point);
            }
        }
        Ok(points)
    }
}
