//! Failure tests: invalid configuration and malformed inputs surface as typed errors.

use std::fs;

use rstest::rstest;
use shpjoin_lib::errors::ShpError;
use shpjoin_lib::exporter::{ExportConfig, MapExporter};
use shpjoin_lib::importer::{ImportConfig, MapImporter};
use shpjoin_lib::loader::{LoadConfig, MapLoader};
use shpjoin_lib::paths::PathConfig;
use shpjoin_lib::record::RecordPositions;
use shpjoin_lib::shapefile::{ShapeType, ShapefileBuilder, ShapefileReaderConfig};
use shpjoin_lib::task::{CancellationToken, TaskStatus};

use crate::helpers::{MapFixture, PIPELINE_TIMEOUT, polygon_map, run_with_timeout, square};

const POSITIONS: RecordPositions = RecordPositions::new(1, 2, 0);

/// Run an import that is expected to fail and return its leaf errors.
fn failed_import(fixture: &MapFixture, config: ImportConfig) -> Vec<String> {
    let importer = MapImporter::new(&fixture.paths, config).unwrap();
    let error = run_with_timeout(PIPELINE_TIMEOUT, move || {
        let error = importer.run(&POSITIONS).expect_err("import should fail");
        assert_eq!(importer.status(), TaskStatus::Faulted);
        error
    });
    error.leaves().into_iter().map(|e| format!("{e:?}")).collect()
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_unvalidated_paths_are_rejected() {
    let fixture = MapFixture::new();
    let raw = PathConfig::new(
        fixture.paths.geometry_dir(),
        fixture.paths.attribute_dir(),
        fixture.paths.output_dir(),
        "map",
    );
    assert!(matches!(
        MapImporter::new(&raw, ImportConfig::default()),
        Err(ShpError::UnvalidatedPaths { .. })
    ));
    assert!(matches!(
        MapExporter::new(&raw, ExportConfig::default()),
        Err(ShpError::UnvalidatedPaths { .. })
    ));
}

#[rstest]
#[case::empty("")]
#[case::separator("maps/cousub")]
#[case::parent("..")]
fn test_bad_file_name_is_rejected(#[case] name: &str) {
    let fixture = MapFixture::new();
    let result = PathConfig::new(
        fixture.paths.geometry_dir(),
        fixture.paths.attribute_dir(),
        fixture.paths.output_dir(),
        name,
    )
    .validate();
    assert!(matches!(result, Err(ShpError::InvalidParameter { .. })));
}

#[test]
fn test_missing_directories_are_created() {
    let fixture = MapFixture::new();
    let root = fixture.dir.path().join("fresh");
    let paths =
        PathConfig::new(root.join("a"), root.join("b"), root.join("c/d"), "map").validate().unwrap();
    assert!(paths.geometry_dir().is_dir());
    assert!(paths.attribute_dir().is_dir());
    assert!(paths.output_dir().is_dir());
}

#[test]
fn test_loader_rejects_missing_file() {
    let fixture = MapFixture::new();
    let result =
        MapLoader::new(fixture.paths.export_path(), &LoadConfig::default(), &CancellationToken::new());
    assert!(matches!(result, Err(ShpError::InvalidPath { .. })));
}

// ============================================================================
// Malformed inputs
// ============================================================================

#[test]
fn test_unsupported_shape_type_faults_import() {
    let fixture = MapFixture::new();
    fixture.write_geometry(
        &ShapefileBuilder::new(ShapeType::Polygon).polygon(&square(1)).raw_record(31, &[0; 16]),
    );
    fixture.write_rows(&[("a", 1, 1), ("b", 2, 2)]);

    let leaves = failed_import(&fixture, ImportConfig::default());
    assert!(leaves.iter().any(|e| e.starts_with("UnsupportedShapeType")), "{leaves:?}");
}

#[rstest]
#[case::over_default_tolerance(ShapefileReaderConfig::default(), true)]
#[case::within_raised_tolerance(ShapefileReaderConfig::default().with_corrupt_tolerance(2), false)]
fn test_corrupt_records_against_tolerance(
    #[case] reader: ShapefileReaderConfig,
    #[case] fails: bool,
) {
    let fixture = MapFixture::new();
    fixture.write_geometry(
        &ShapefileBuilder::new(ShapeType::Polygon)
            .corrupt_polygon(-1, 4)
            .polygon(&square(2))
            .corrupt_polygon(1, -4),
    );
    fixture.write_rows(&[("a", 1, 1)]);

    let config = ImportConfig::default().with_reader(reader);
    if fails {
        let leaves = failed_import(&fixture, config);
        assert!(leaves.iter().any(|e| e.starts_with("CorruptedInput")), "{leaves:?}");
    } else {
        let importer = MapImporter::new(&fixture.paths, config).unwrap();
        let report = importer.run(&POSITIONS).unwrap();
        assert_eq!(report.geometries_read, 1);
        assert_eq!(report.records_imported, 1);
    }
}

#[test]
fn test_truncated_header_faults_import() {
    let fixture = MapFixture::new();
    fs::write(fixture.paths.geometry_path(), [0_u8; 40]).unwrap();
    fixture.write_rows(&[("a", 1, 1)]);

    let leaves = failed_import(&fixture, ImportConfig::default());
    assert!(leaves.iter().any(|e| e.starts_with("InvalidHeader")), "{leaves:?}");
}

#[test]
fn test_missing_attribute_file_faults_import() {
    let fixture = MapFixture::new();
    fixture.write_geometry(&ShapefileBuilder::new(ShapeType::Point).point(1.0, 1.0));

    let leaves = failed_import(&fixture, ImportConfig::default());
    assert!(leaves.iter().any(|e| e.starts_with("InvalidPath")), "{leaves:?}");
}

#[test]
fn test_short_attribute_row_faults_import() {
    let fixture = MapFixture::new();
    fixture.write_geometry(&ShapefileBuilder::new(ShapeType::Point).point(1.0, 1.0));
    fixture.write_attributes("NAME,GEOID,COUSUBFP\nonly-a-name\n");

    let leaves = failed_import(&fixture, ImportConfig::default());
    assert!(leaves.iter().any(|e| e.starts_with("ColumnOutOfRange")), "{leaves:?}");
}

#[rstest]
#[case::garbage("not a record")]
#[case::blank("")]
#[case::missing_field(r#"{"recordNumber":1,"points":[],"primaryId":1,"name":"x"}"#)]
fn test_malformed_persisted_line_faults_load(#[case] bad_line: &str) {
    let fixture = polygon_map(3);
    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    importer.run(&POSITIONS).unwrap();
    let exporter = MapExporter::new(&fixture.paths, ExportConfig::default()).unwrap();
    exporter.export_records(importer.take_records()).unwrap();

    let path = exporter.export_path().to_path_buf();
    let mut text = fs::read_to_string(&path).unwrap();
    text.push_str(bad_line);
    text.push('\n');
    fs::write(&path, text).unwrap();

    let loader = MapLoader::new(&path, &LoadConfig::default(), &CancellationToken::new()).unwrap();
    let error = loader.load().expect_err("load should fail");
    assert!(
        error.leaves().iter().any(|e| matches!(e, ShpError::MalformedRecord(_))),
        "{error:?}"
    );
}
