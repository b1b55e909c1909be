//! Progress tracking for pipeline stages.
//!
//! Every stage owns one or more [`StageProgress`] counters (records read, lines converted,
//! records written, ...). Counters are updated with a single atomic add from any worker and
//! read without locking. Each update can:
//!
//! - log a milestone every time the count crosses a multiple of the logging interval
//! - invoke an optional [`ProgressCallback`] with a fresh [`ProgressSnapshot`]
//!
//! Snapshots are informational only; no pipeline decision is made from them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::info;
use parking_lot::RwLock;

use crate::logging::format_count;
use crate::task::{TaskState, TaskStatus};

/// Callback invoked with a fresh snapshot after every recorded item.
pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Default number of items between progress log lines.
pub const DEFAULT_LOG_INTERVAL: u64 = 100_000;

/// Percentage of `done` out of `total`, in `[0, 100]` when `done <= total`.
///
/// Returns 0 when either operand is 0.
///
/// # Example
/// ```
/// use shpjoin_lib::progress::percent_complete;
///
/// assert_eq!(percent_complete(50, 200), 25.0);
/// assert_eq!(percent_complete(3, 0), 0.0);
/// ```
#[must_use]
pub fn percent_complete(done: u64, total: u64) -> f64 {
    if done == 0 || total == 0 { 0.0 } else { done as f64 / total as f64 * 100.0 }
}

/// Point-in-time view of one stage counter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Counter label, e.g. "Records read".
    pub label: String,
    /// Items produced or consumed so far.
    pub items_done: u64,
    /// Expected number of items, 0 when unknown.
    pub total_items: u64,
    /// `items_done` as a percentage of `total_items`.
    pub percent_done: f64,
    /// The owning stage is running.
    pub is_active: bool,
    /// The owning stage has reached a terminal status.
    pub is_complete: bool,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total_items > 0 {
            write!(
                f,
                "{} {}/{} ({:.1}%)",
                self.label,
                format_count(self.items_done),
                format_count(self.total_items),
                self.percent_done
            )
        } else {
            write!(f, "{} {}", self.label, format_count(self.items_done))
        }
    }
}

/// Thread-safe counter for one stage.
///
/// # Example
/// ```
/// use shpjoin_lib::progress::StageProgress;
/// use shpjoin_lib::task::TaskState;
///
/// let progress = StageProgress::new("Lines read", TaskState::new("producer"))
///     .with_log_interval(100);
/// progress.set_total(250);
/// for _ in 0..250 {
///     progress.record(1); // Logs at 100, 200
/// }
/// progress.log_final(); // Logs "Lines read 250 (complete)"
/// assert_eq!(progress.snapshot().percent_done, 100.0);
/// ```
pub struct StageProgress {
    label: String,
    state: TaskState,
    done: AtomicU64,
    total: AtomicU64,
    log_interval: u64,
    callback: RwLock<Option<ProgressCallback>>,
}

impl StageProgress {
    /// Create a counter whose activity flags follow `state`.
    #[must_use]
    pub fn new(label: impl Into<String>, state: TaskState) -> Self {
        Self {
            label: label.into(),
            state,
            done: AtomicU64::new(0),
            total: AtomicU64::new(0),
            log_interval: DEFAULT_LOG_INTERVAL,
            callback: RwLock::new(None),
        }
    }

    /// Log a milestone every `interval` items (0 disables milestone logging).
    #[must_use]
    pub fn with_log_interval(mut self, interval: u64) -> Self {
        self.log_interval = interval;
        self
    }

    /// Install (or replace) the progress callback.
    pub fn set_callback(&self, callback: ProgressCallback) {
        *self.callback.write() = Some(callback);
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Set the expected number of items.
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }

    /// Expected number of items, 0 when unknown.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Items recorded so far.
    #[must_use]
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Acquire)
    }

    /// Add `additional` items, logging each interval boundary crossed.
    ///
    /// Returns the new count.
    pub fn record(&self, additional: u64) -> u64 {
        let previous = self.done.fetch_add(additional, Ordering::AcqRel);
        let count = previous + additional;
        if self.log_interval > 0 {
            for milestone in (previous / self.log_interval + 1)..=(count / self.log_interval) {
                info!("{} {}", self.label, format_count(milestone * self.log_interval));
            }
        }
        if let Some(callback) = self.callback.read().as_ref() {
            callback(&self.snapshot());
        }
        count
    }

    /// Log the final count unless the last milestone already covered it.
    pub fn log_final(&self) {
        let count = self.done();
        if count > 0 && (self.log_interval == 0 || !count.is_multiple_of(self.log_interval)) {
            info!("{} {} (complete)", self.label, format_count(count));
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let items_done = self.done();
        let total_items = self.total();
        let status = self.state.status();
        ProgressSnapshot {
            label: self.label.clone(),
            items_done,
            total_items,
            percent_done: percent_complete(items_done, total_items),
            is_active: status == TaskStatus::Running,
            is_complete: status.is_terminal(),
        }
    }
}

impl fmt::Debug for StageProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageProgress")
            .field("label", &self.label)
            .field("done", &self.done())
            .field("total", &self.total())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread;

    #[rstest]
    #[case(0, 100, 0.0)]
    #[case(100, 0, 0.0)]
    #[case(25, 100, 25.0)]
    #[case(100, 100, 100.0)]
    fn test_percent_complete(#[case] done: u64, #[case] total: u64, #[case] expected: f64) {
        assert!((percent_complete(done, total) - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_returns_running_count() {
        let progress = StageProgress::new("Rows", TaskState::new("split")).with_log_interval(10);
        assert_eq!(progress.record(4), 4);
        assert_eq!(progress.record(30), 34);
        assert_eq!(progress.done(), 34);
    }

    #[test]
    fn test_snapshot_follows_state() {
        let state = TaskState::new("reader");
        let progress = StageProgress::new("Records read", state.clone());
        progress.set_total(4);
        progress.record(1);

        let snapshot = progress.snapshot();
        assert!(!snapshot.is_active);
        assert!(!snapshot.is_complete);
        assert!((snapshot.percent_done - 25.0).abs() < f64::EPSILON);

        state.start();
        assert!(progress.snapshot().is_active);
        state.finish(TaskStatus::RanToCompletion);
        let snapshot = progress.snapshot();
        assert!(!snapshot.is_active);
        assert!(snapshot.is_complete);
    }

    #[test]
    fn test_callback_sees_every_item() {
        let seen = Arc::new(AtomicU64::new(0));
        let progress = StageProgress::new("Lines", TaskState::new("producer"));
        let observer = Arc::clone(&seen);
        progress.set_callback(Arc::new(move |snapshot: &ProgressSnapshot| {
            observer.fetch_max(snapshot.items_done, Ordering::Relaxed);
        }));
        for _ in 0..5 {
            progress.record(1);
        }
        assert_eq!(seen.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_snapshot_display() {
        let progress = StageProgress::new("Records written", TaskState::new("writer"));
        progress.record(1500);
        assert_eq!(progress.snapshot().to_string(), "Records written 1,500");
        progress.set_total(3000);
        assert_eq!(progress.snapshot().to_string(), "Records written 1,500/3,000 (50.0%)");
    }

    #[test]
    fn test_concurrent_records() {
        let progress = Arc::new(StageProgress::new("Lines", TaskState::new("pool")));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let progress = Arc::clone(&progress);
                thread::spawn(move || {
                    for _ in 0..125 {
                        progress.record(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(progress.done(), 1000);
        progress.log_final();
    }
}
