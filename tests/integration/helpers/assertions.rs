//! Custom assertion helpers for integration tests.

#![allow(dead_code)]

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use shpjoin_lib::record::UnifiedRecord;

/// Upper bound for any single pipeline run in these tests.
pub const PIPELINE_TIMEOUT: Duration = Duration::from_secs(30);

/// Sort records by record number so unordered outputs can be compared.
#[must_use]
pub fn sorted(mut records: Vec<UnifiedRecord>) -> Vec<UnifiedRecord> {
    records.sort_by_key(|r| r.record_number);
    records
}

/// Asserts that two record collections hold the same records, ignoring order.
///
/// # Panics
///
/// Panics if the collections differ.
pub fn assert_same_records(actual: Vec<UnifiedRecord>, expected: Vec<UnifiedRecord>) {
    let actual = sorted(actual);
    let expected = sorted(expected);
    assert_eq!(actual.len(), expected.len(), "record counts differ");
    for (a, e) in actual.iter().zip(&expected) {
        assert_eq!(a, e, "record {} differs", e.record_number);
    }
}

/// Asserts that a record joined the square geometry and attribute row numbered `n`.
///
/// # Panics
///
/// Panics if any field does not match.
pub fn assert_joined(record: &UnifiedRecord, n: i32) {
    assert_eq!(record.record_number, n);
    assert_eq!(record.primary_id, n, "primary id of record {n}");
    assert_eq!(record.secondary_id, 1000 + n, "secondary id of record {n}");
    assert_eq!(record.name, format!("place-{n}"));
    assert_eq!(record.points.first().map(|p| p.x), Some(f64::from(n)));
}

/// Run `work` on its own thread and fail if it does not finish within `timeout`.
///
/// # Panics
///
/// Panics if `work` panics or the timeout elapses.
pub fn run_with_timeout<T, F>(timeout: Duration, work: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(work());
    });
    receiver.recv_timeout(timeout).unwrap_or_else(|e| panic!("work did not finish within {timeout:?}: {e}"))
}
