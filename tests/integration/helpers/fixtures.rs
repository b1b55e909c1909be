//! Fixture writers for integration tests.
//!
//! A [`MapFixture`] owns a temporary directory laid out like a real import: geometry,
//! attribute and output directories plus a validated [`PathConfig`].

#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;

use shpjoin_lib::paths::PathConfig;
use shpjoin_lib::shapefile::{ShapeType, ShapefileBuilder};
use tempfile::TempDir;

/// Base name used by every fixture.
pub const MAP_NAME: &str = "tl_2019_16_cousub";

/// Header line of fixture attribute files; the columns are `name,primary,secondary`.
pub const ATTRIBUTE_HEADER: &str = "NAME,GEOID,COUSUBFP";

/// A temporary map layout.
pub struct MapFixture {
    pub dir: TempDir,
    pub paths: PathConfig,
}

impl MapFixture {
    /// Create the directories and validate them.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created or validated.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let paths = PathConfig::new(
            dir.path().join("shp"),
            dir.path().join("csv"),
            dir.path().join("out"),
            MAP_NAME,
        )
        .validate()
        .expect("Fixture paths should validate");
        Self { dir, paths }
    }

    /// Write the geometry file.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_geometry(&self, builder: &ShapefileBuilder) {
        builder.write_to(self.paths.geometry_path()).expect("Failed to write geometry file");
    }

    /// Write the attribute file verbatim.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_attributes(&self, text: &str) {
        fs::write(self.paths.attribute_path(), text).expect("Failed to write attribute file");
    }

    /// Write an attribute file with a header and one `name,primary,secondary` line per row.
    pub fn write_rows(&self, rows: &[(&str, i32, i32)]) {
        self.write_attributes(&attribute_csv(rows));
    }
}

impl Default for MapFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Render attribute rows below [`ATTRIBUTE_HEADER`].
#[must_use]
pub fn attribute_csv(rows: &[(&str, i32, i32)]) -> String {
    let mut text = format!("{ATTRIBUTE_HEADER}\n");
    for (name, primary, secondary) in rows {
        let _ = writeln!(text, "{name},{primary},{secondary}");
    }
    text
}

/// A unit square polygon offset by `n`, closed on its first vertex.
#[must_use]
pub fn square(n: i32) -> Vec<(f64, f64)> {
    let o = f64::from(n);
    vec![(o, o), (o + 1.0, o), (o + 1.0, o + 1.0), (o, o + 1.0), (o, o)]
}

/// A polygon map of `count` squares with matching attribute rows `("place-n", n, 1000 + n)`.
///
/// # Panics
///
/// Panics if the fixture files cannot be written.
#[must_use]
pub fn polygon_map(count: i32) -> MapFixture {
    let fixture = MapFixture::new();
    let builder =
        (1..=count).fold(ShapefileBuilder::new(ShapeType::Polygon), |b, n| b.polygon(&square(n)));
    fixture.write_geometry(&builder);
    let names: Vec<String> = (1..=count).map(|n| format!("place-{n}")).collect();
    let rows: Vec<(&str, i32, i32)> =
        names.iter().zip(1..=count).map(|(name, n)| (name.as_str(), n, 1000 + n)).collect();
    fixture.write_rows(&rows);
    fixture
}
