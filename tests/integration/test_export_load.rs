//! Export and reload tests for persisted record files.

use std::fs;

use proptest::prelude::*;
use shpjoin_lib::errors::ShpError;
use shpjoin_lib::exporter::{ExportConfig, MapExporter};
use shpjoin_lib::loader::{LoadConfig, MapLoader};
use shpjoin_lib::record::{Point3, UnifiedRecord};
use shpjoin_lib::task::{CancellationToken, TaskStatus};

use crate::helpers::{MapFixture, assert_same_records};

fn export_and_reload(fixture: &MapFixture, records: Vec<UnifiedRecord>) -> Vec<UnifiedRecord> {
    let exporter = MapExporter::new(&fixture.paths, ExportConfig::default()).unwrap();
    assert_eq!(exporter.export_records(records).unwrap(), TaskStatus::RanToCompletion);
    let loader =
        MapLoader::new(exporter.export_path(), &LoadConfig::default(), &CancellationToken::new()).unwrap();
    assert_eq!(loader.load().unwrap(), TaskStatus::RanToCompletion);
    loader.take_records()
}

#[test]
fn test_single_record_round_trip() {
    let fixture = MapFixture::new();
    let record = UnifiedRecord {
        record_number: 5,
        points: vec![Point3::new(1.0, 2.0, 3.0)],
        primary_id: 10,
        secondary_id: 20,
        name: "X".to_string(),
    };
    assert_eq!(export_and_reload(&fixture, vec![record.clone()]), vec![record]);
}

#[test]
fn test_persisted_lines_are_self_contained() {
    let fixture = MapFixture::new();
    let records: Vec<UnifiedRecord> = (1..=20)
        .map(|n| UnifiedRecord {
            record_number: n,
            points: (0..n).map(|i| Point3::new(f64::from(i), f64::from(-i), 1.0)).collect(),
            primary_id: n,
            secondary_id: 0,
            name: format!("line {n}\twith tab, comma and \"quotes\""),
        })
        .collect();
    let exporter =
        MapExporter::new(&fixture.paths, ExportConfig::default().with_serialize_workers(4)).unwrap();
    exporter.export_records(records.clone()).unwrap();
    assert_eq!(exporter.records_serialized(), 20);
    assert_eq!(exporter.records_written(), 20);

    let text = fs::read_to_string(exporter.export_path()).unwrap();
    assert!(text.ends_with('\n'));
    let parsed: Vec<UnifiedRecord> = text.lines().map(|l| UnifiedRecord::from_line(l).unwrap()).collect();
    assert_same_records(parsed, records);
}

#[test]
fn test_export_replaces_previous_file() {
    let fixture = MapFixture::new();
    let first: Vec<UnifiedRecord> = (1..=10).map(|n| simple_record(n, "first")).collect();
    let second = vec![simple_record(99, "second")];

    export_and_reload(&fixture, first);
    assert_eq!(export_and_reload(&fixture, second.clone()), second);
}

#[test]
fn test_empty_collection_round_trips() {
    let fixture = MapFixture::new();
    assert!(export_and_reload(&fixture, Vec::new()).is_empty());
}

#[test]
fn test_non_finite_coordinate_fails_export_instead_of_reload() {
    let fixture = MapFixture::new();
    let mut bad = simple_record(2, "bad");
    bad.points.push(Point3::new(f64::NAN, 0.0, 1.0));

    let exporter = MapExporter::new(&fixture.paths, ExportConfig::default()).unwrap();
    let error = exporter.export_records(vec![simple_record(1, "good"), bad]).unwrap_err();
    assert!(error.leaves().iter().any(|e| matches!(e, ShpError::MalformedRecord(_))), "{error:?}");

    // Whatever reached the file is still loadable
    let loader =
        MapLoader::new(exporter.export_path(), &LoadConfig::default(), &CancellationToken::new()).unwrap();
    assert_eq!(loader.load().unwrap(), TaskStatus::RanToCompletion);
    assert!(loader.take_records().iter().all(|r| r.points.iter().all(Point3::is_finite)));
}

fn simple_record(n: i32, name: &str) -> UnifiedRecord {
    UnifiedRecord {
        record_number: n,
        points: vec![Point3::new(0.5, 0.25, 1.0)],
        primary_id: n,
        secondary_id: n,
        name: name.to_string(),
    }
}

// ============================================================================
// Exact float equality
// ============================================================================

fn finite() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_reload_preserves_coordinates_exactly(
        coordinates in prop::collection::vec((finite(), finite()), 0..40),
        name in "[^\n\r]{0,24}",
        primary_id in any::<i32>(),
    ) {
        let fixture = MapFixture::new();
        let record = UnifiedRecord {
            record_number: 1,
            points: coordinates.iter().map(|&(x, y)| Point3::new(x, y, 1.0)).collect(),
            primary_id,
            secondary_id: -primary_id.saturating_abs(),
            name,
        };
        let reloaded = export_and_reload(&fixture, vec![record.clone()]);
        prop_assert_eq!(reloaded, vec![record]);
    }
}
