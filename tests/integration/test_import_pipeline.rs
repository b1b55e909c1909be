//! End-to-end import tests: geometry file + attribute file -> unified records.

use std::fs;

use shpjoin_lib::attributes::AttributeReaderConfig;
use shpjoin_lib::correlator::CorrelatorConfig;
use shpjoin_lib::exporter::{ExportConfig, MapExporter};
use shpjoin_lib::importer::{ImportConfig, MapImporter};
use shpjoin_lib::loader::{LoadConfig, MapLoader};
use shpjoin_lib::record::{Point3, RecordPositions};
use shpjoin_lib::shapefile::{MULTIPOINT_Z, POINT_Z, POLY_Z, ShapeType, ShapefileBuilder};
use shpjoin_lib::task::{CancellationToken, TaskStatus};

use crate::helpers::{
    MapFixture, PIPELINE_TIMEOUT, assert_joined, assert_same_records, polygon_map, run_with_timeout,
    sorted, square,
};

/// `NAME,GEOID,COUSUBFP`: primary id in column 1, secondary id in column 2, name in column 0.
const POSITIONS: RecordPositions = RecordPositions::new(1, 2, 0);

// ============================================================================
// Joining
// ============================================================================

#[test]
fn test_mixed_shapes_join_with_rows() {
    let fixture = MapFixture::new();
    fixture.write_geometry(
        &ShapefileBuilder::new(ShapeType::Polygon)
            .point(1.0, 1.0)
            .polygon(&[(0.0, 0.0), (2.0, 0.0), (2.0, 0.0), (2.0, 2.0)])
            .null(),
    );
    fixture.write_rows(&[("Ada", 16001, 1), ("Boise", 16015, 2), ("Canyon", 16027, 3)]);

    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    let report = importer.run(&POSITIONS).unwrap();
    assert_eq!(report.status, TaskStatus::RanToCompletion);
    assert!(report.summary.unwrap().is_complete());

    let records = importer.take_records();
    assert_eq!(records.iter().map(|r| r.points.len()).collect::<Vec<_>>(), vec![1, 3, 0]);
    assert_eq!(records[0].points, vec![Point3::new(1.0, 1.0, POINT_Z)]);
    assert_eq!(
        records[1].points,
        vec![
            Point3::new(0.0, 0.0, POLY_Z),
            Point3::new(2.0, 0.0, POLY_Z),
            Point3::new(2.0, 2.0, POLY_Z)
        ]
    );
    assert_eq!(
        records.iter().map(|r| (r.name.as_str(), r.primary_id, r.secondary_id)).collect::<Vec<_>>(),
        vec![("Ada", 16001, 1), ("Boise", 16015, 2), ("Canyon", 16027, 3)]
    );
}

#[test]
fn test_multipoint_and_polyline_records() {
    let fixture = MapFixture::new();
    fixture.write_geometry(
        &ShapefileBuilder::new(ShapeType::Multipoint)
            .multipoint(&[(1.0, 1.0), (1.0, 1.0), (3.0, 4.0)])
            .poly_line(&[(0.0, 0.0), (0.0, 0.0), (5.0, 5.0)]),
    );
    fixture.write_rows(&[("m", 1, 2), ("l", 3, 4)]);

    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    importer.run(&POSITIONS).unwrap();
    let records = importer.take_records();
    // Duplicates only collapse for polylines and polygons
    assert_eq!(records[0].points.len(), 3);
    assert!(records[0].points.iter().all(|p| (p.z - MULTIPOINT_Z).abs() < f64::EPSILON));
    assert_eq!(records[1].points.len(), 2);
}

#[test]
fn test_large_map_stays_aligned() {
    let fixture = polygon_map(2_000);
    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    let (report, records) = run_with_timeout(PIPELINE_TIMEOUT, move || {
        let report = importer.run(&POSITIONS).unwrap();
        (report, importer.take_records())
    });
    assert_eq!(report.records_imported, 2_000);
    assert_eq!(report.summary.unwrap().expected, 2_000);
    for (i, record) in records.iter().enumerate() {
        assert_joined(record, i32::try_from(i + 1).unwrap());
        assert_eq!(record.points.len(), 5);
    }
}

#[test]
fn test_unparseable_ids_default_to_zero() {
    let fixture = MapFixture::new();
    fixture.write_geometry(&ShapefileBuilder::new(ShapeType::Point).point(0.0, 0.0));
    fixture.write_attributes("NAME,GEOID,COUSUBFP\n Spaced Name ,n/a, 42 \n");

    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    importer.run(&POSITIONS).unwrap();
    let record = &importer.take_records()[0];
    assert_eq!((record.primary_id, record.secondary_id), (0, 42));
    assert_eq!(record.name, " Spaced Name ");
}

#[test]
fn test_latin1_attribute_cell_is_imported_lossily() {
    let fixture = MapFixture::new();
    fixture.write_geometry(
        &(1..=2).fold(ShapefileBuilder::new(ShapeType::Polygon), |b, n| b.polygon(&square(n))),
    );
    fs::write(fixture.paths.attribute_path(), b"NAME,GEOID,COUSUBFP\nA\xf1asco,1,1001\nplace-2,2,1002\n")
        .unwrap();

    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    let report = importer.run(&POSITIONS).unwrap();
    assert_eq!(report.status, TaskStatus::RanToCompletion);
    assert!(report.summary.unwrap().is_complete());

    let records = importer.take_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "A\u{FFFD}asco");
    assert_eq!((records[0].primary_id, records[0].secondary_id), (1, 1001));
    assert_joined(&records[1], 2);
}

#[test]
fn test_simplification_thins_points() {
    let fixture = MapFixture::new();
    let wiggly: Vec<(f64, f64)> = (0..=100).map(|i| (f64::from(i), f64::from(i % 2) * 0.001)).collect();
    fixture.write_geometry(&ShapefileBuilder::new(ShapeType::PolyLine).poly_line(&wiggly));
    fixture.write_rows(&[("line", 1, 2)]);

    let config = ImportConfig::default()
        .with_correlator(CorrelatorConfig::default().with_simplify_tolerance(Some(0.01)));
    let importer = MapImporter::new(&fixture.paths, config).unwrap();
    importer.run(&POSITIONS).unwrap();
    let record = &importer.take_records()[0];
    assert_eq!(
        record.points,
        vec![Point3::new(0.0, 0.0, POLY_Z), Point3::new(100.0, 0.0, POLY_Z)]
    );
}

// ============================================================================
// Count mismatches
// ============================================================================

#[test]
fn test_surplus_geometries_are_reported_not_raised() {
    let fixture = MapFixture::new();
    fixture.write_geometry(
        &(1..=4).fold(ShapefileBuilder::new(ShapeType::Polygon), |b, n| b.polygon(&square(n))),
    );
    fixture.write_rows(&[("place-1", 1, 1001), ("place-2", 2, 1002)]);

    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    let report = importer.run(&POSITIONS).unwrap();
    assert_eq!(report.status, TaskStatus::RanToCompletion);
    let summary = report.summary.unwrap();
    assert!(!summary.is_complete());
    assert_eq!((summary.emitted, summary.expected), (2, 2));
    assert!(summary.leftover_geometries >= 1);
}

#[test]
fn test_tolerated_corrupt_record_misaligns_counts() {
    let fixture = MapFixture::new();
    fixture.write_geometry(
        &ShapefileBuilder::new(ShapeType::Polygon)
            .polygon(&square(1))
            .corrupt_polygon(-1, 4)
            .polygon(&square(3)),
    );
    fixture.write_rows(&[("place-1", 1, 1001), ("place-2", 2, 1002), ("place-3", 3, 1003)]);

    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    let report = importer.run(&POSITIONS).unwrap();
    assert_eq!(report.geometries_read, 2);
    let summary = report.summary.unwrap();
    assert_eq!((summary.emitted, summary.expected, summary.leftover_rows), (2, 3, 1));

    // Positional join: the third geometry picks up the second row
    let records = importer.take_records();
    assert_eq!(records[1].record_number, 3);
    assert_eq!(records[1].name, "place-2");
}

#[test]
fn test_header_only_attribute_file() {
    let fixture = MapFixture::new();
    fixture.write_geometry(&ShapefileBuilder::new(ShapeType::Point));
    fixture.write_attributes("NAME,GEOID,COUSUBFP\n");

    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    let report = importer.run(&POSITIONS).unwrap();
    assert_eq!(report.records_imported, 0);
    assert!(report.summary.unwrap().is_complete());
}

// ============================================================================
// Import feeding export
// ============================================================================

#[test]
fn test_streaming_export_while_importing() {
    let fixture = polygon_map(500);
    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    let exporter =
        MapExporter::new(&fixture.paths, ExportConfig::default().with_serialize_workers(3)).unwrap();

    importer.start(&POSITIONS).unwrap();
    exporter.start(importer.records(), importer.records_state()).unwrap();
    assert_eq!(importer.wait().unwrap().records_imported, 500);
    assert_eq!(exporter.wait().unwrap(), TaskStatus::RanToCompletion);
    assert_eq!(exporter.records_written(), 500);
    assert!(importer.take_records().is_empty());

    let loader =
        MapLoader::new(exporter.export_path(), &LoadConfig::default().with_threads(4), &CancellationToken::new())
            .unwrap();
    loader.load().unwrap();
    let records = loader.take_records();
    assert_eq!(records.len(), 500);
    for record in &sorted(records) {
        assert_joined(record, record.record_number);
    }
}

#[test]
fn test_many_split_workers_still_import_every_row() {
    let fixture = polygon_map(300);
    let config =
        ImportConfig::default().with_attributes(AttributeReaderConfig::default().with_split_workers(4));
    let importer = MapImporter::new(&fixture.paths, config).unwrap();
    let report = importer.run(&POSITIONS).unwrap();
    assert_eq!(report.records_imported, 300);

    // Rows may pair with the wrong geometry, but every row is used exactly once
    let mut ids: Vec<i32> = importer.take_records().iter().map(|r| r.primary_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=300).collect::<Vec<_>>());
}

#[test]
fn test_import_then_export_round_trips() {
    let fixture = polygon_map(50);
    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    importer.run(&POSITIONS).unwrap();
    let imported = importer.take_records();

    let exporter = MapExporter::new(&fixture.paths, ExportConfig::default()).unwrap();
    exporter.export_records(imported.clone()).unwrap();
    let loader = MapLoader::new(exporter.export_path(), &LoadConfig::default(), &CancellationToken::new()).unwrap();
    loader.load().unwrap();
    assert_same_records(loader.take_records(), imported);
}
