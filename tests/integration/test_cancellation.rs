//! Cancellation tests: canceled pipelines finish as `Canceled`, never as faults.

use std::thread;
use std::time::Duration;

use shpjoin_lib::exporter::{ExportConfig, MapExporter};
use shpjoin_lib::importer::{ImportConfig, MapImporter};
use shpjoin_lib::loader::{LoadConfig, MapLoader};
use shpjoin_lib::queue::OrderedChannel;
use shpjoin_lib::record::{Point3, RecordPositions, UnifiedRecord};
use shpjoin_lib::task::{CancellationToken, Stage, TaskState, TaskStatus};

use crate::helpers::{MapFixture, PIPELINE_TIMEOUT, polygon_map, run_with_timeout};

const POSITIONS: RecordPositions = RecordPositions::new(1, 2, 0);

#[test]
fn test_cancel_before_start_reports_canceled() {
    let fixture = polygon_map(200);
    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    importer.cancel();
    let (report, stages, counts) = run_with_timeout(PIPELINE_TIMEOUT, move || {
        let report = importer.run(&POSITIONS).unwrap();
        (report, importer.stage_statuses(), importer.worker_counts())
    });
    assert_eq!(report.status, TaskStatus::Canceled);
    assert!(report.records_imported < 200);
    for (stage, status) in stages {
        assert_eq!(status, TaskStatus::Canceled, "stage {stage}");
    }
    assert_eq!(counts.canceled, counts.total());
}

#[test]
fn test_cancel_mid_import_never_faults() {
    let fixture = polygon_map(20_000);
    let importer = MapImporter::new(&fixture.paths, ImportConfig::default()).unwrap();
    let outcome = run_with_timeout(PIPELINE_TIMEOUT, move || {
        importer.start(&POSITIONS).unwrap();
        thread::sleep(Duration::from_millis(5));
        importer.cancel();
        (importer.wait(), importer.stage_statuses(), importer.worker_counts())
    });
    // The import may win the race, but a cancel must never surface as an error
    let (report, stages, counts) = outcome;
    let report = report.expect("cancellation is not a failure");
    assert_eq!(counts.faulted, 0);
    assert!(stages.iter().all(|(_, status)| status.is_terminal() && *status != TaskStatus::Faulted));
    match report.status {
        TaskStatus::Canceled => {
            assert!(counts.canceled >= 1);
            assert!(stages.iter().any(|(_, status)| *status == TaskStatus::Canceled));
        }
        TaskStatus::RanToCompletion => {
            assert_eq!(report.records_imported, 20_000);
            assert_eq!(counts.completed, counts.total());
        }
        other => panic!("unexpected status {other}"),
    }
}

#[test]
fn test_parent_token_cancels_loader() {
    let fixture = MapFixture::new();
    let path = fixture.paths.export_path();
    let record = UnifiedRecord {
        record_number: 1,
        points: vec![Point3::new(1.0, 2.0, 3.0)],
        primary_id: 1,
        secondary_id: 2,
        name: "loader".to_string(),
    };
    let line = record.to_line().unwrap();
    std::fs::write(&path, format!("{line}\n").repeat(1_000)).unwrap();

    let parent = CancellationToken::new();
    let loader = MapLoader::new(&path, &LoadConfig::default().with_threads(3), &parent).unwrap();
    parent.cancel();
    assert_eq!(loader.load().unwrap(), TaskStatus::Canceled);
    assert!(loader.worker_counts().canceled >= 1);
    assert_eq!(loader.worker_counts().faulted, 0);
}

#[test]
fn test_cancel_exporter_waiting_on_upstream() {
    let fixture = MapFixture::new();
    let exporter = MapExporter::new(&fixture.paths, ExportConfig::default()).unwrap();
    let upstream = TaskState::new("never-finishes");
    upstream.start();

    let status = run_with_timeout(PIPELINE_TIMEOUT, move || {
        exporter.start(OrderedChannel::shared(), Some(upstream)).unwrap();
        thread::sleep(Duration::from_millis(30));
        exporter.cancel();
        exporter.wait().unwrap()
    });
    assert_eq!(status, TaskStatus::Canceled);
}
