//! Worker accounting and failure classification for a single stage.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use log::debug;
use parking_lot::Mutex;

use super::cancellation::CancellationToken;
use super::status::{TaskState, TaskStatus};
use crate::errors::{Interrupt, Result, ShpError, WorkResult};
use crate::logging::log_stage_faults;

/// Number of workers of a stage in each lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCounts {
    pub created: usize,
    pub running: usize,
    pub completed: usize,
    pub canceled: usize,
    pub faulted: usize,
}

impl WorkerCounts {
    /// Total number of workers.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.running + self.completed + self.canceled + self.faulted
    }
}

impl std::ops::Add for WorkerCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            created: self.created + other.created,
            running: self.running + other.running,
            completed: self.completed + other.completed,
            canceled: self.canceled + other.canceled,
            faulted: self.faulted + other.faulted,
        }
    }
}

struct StageShared {
    name: String,
    state: TaskState,
    token: CancellationToken,
    live: AtomicUsize,
    cancelled: AtomicUsize,
    failures: Mutex<Vec<ShpError>>,
}

impl StageShared {
    fn workers_exited(&self, count: usize) {
        if self.live.fetch_sub(count, Ordering::AcqRel) == count {
            self.finalize();
        }
    }

    /// Runs exactly once, on the thread of the last worker to exit.
    fn finalize(&self) {
        let failures = self.failures.lock();
        let status = if !failures.is_empty() {
            log_stage_faults(&self.name, &failures);
            TaskStatus::Faulted
        } else if self.cancelled.load(Ordering::Acquire) > 0 {
            debug!("Stage '{}' canceled", self.name);
            TaskStatus::Canceled
        } else {
            TaskStatus::RanToCompletion
        };
        drop(failures);
        self.state.finish(status);
    }
}

/// Extract a message from a panic payload.
#[must_use]
pub fn extract_panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// The lifecycle capability every pipeline stage holds.
///
/// Bundles the stage's [`TaskState`], a [`CancellationToken`] derived from the caller's,
/// and the stage's worker threads. Workers are launched once via [`StageControl::launch`];
/// the stage state becomes terminal as soon as the last worker exits, whether or not anyone
/// has called [`StageControl::join`] yet, so downstream stages can monitor it.
///
/// Classification when the last worker exits:
/// - any worker failed (or panicked): `Faulted`; every failure is logged with its cause chain
///   and a fault cancels the sibling workers
/// - otherwise any worker was cancelled: `Canceled`
/// - otherwise: `RanToCompletion`
pub struct StageControl {
    shared: Arc<StageShared>,
    workers: Mutex<Vec<TaskState>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl StageControl {
    /// Create a stage whose token is a child of `parent`.
    #[must_use]
    pub fn new(name: impl Into<String>, parent: &CancellationToken) -> Self {
        let name = name.into();
        Self {
            shared: Arc::new(StageShared {
                state: TaskState::new(name.clone()),
                name,
                token: parent.child(),
                live: AtomicUsize::new(0),
                cancelled: AtomicUsize::new(0),
                failures: Mutex::new(Vec::new()),
            }),
            workers: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// A handle to the stage state, for monitoring from other stages.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.shared.state.clone()
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.shared.state.status()
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.shared.token
    }

    /// Cancel every worker of this stage. Idempotent.
    pub fn cancel(&self) {
        self.shared.token.cancel();
    }

    /// Count this stage's workers by status.
    #[must_use]
    pub fn worker_counts(&self) -> WorkerCounts {
        let mut counts = WorkerCounts::default();
        for worker in self.workers.lock().iter() {
            match worker.status() {
                TaskStatus::Created => counts.created += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::RanToCompletion => counts.completed += 1,
                TaskStatus::Canceled => counts.canceled += 1,
                TaskStatus::Faulted => counts.faulted += 1,
            }
        }
        counts
    }

    /// Start `workers` threads, each running `work(worker_index, token)`.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if `workers` is zero or the stage was already launched.
    /// A thread that fails to spawn is recorded as a worker failure instead.
    pub fn launch<F>(&self, workers: usize, work: F) -> Result<()>
    where
        F: Fn(usize, &CancellationToken) -> WorkResult + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(ShpError::InvalidParameter {
                parameter: format!("{} workers", self.shared.name),
                reason: "at least one worker is required".to_string(),
            });
        }
        if !self.shared.state.start() {
            return Err(ShpError::InvalidParameter {
                parameter: self.shared.name.clone(),
                reason: format!("stage cannot be launched while {}", self.shared.state.status()),
            });
        }
        self.shared.live.store(workers, Ordering::Release);

        let work = Arc::new(work);
        let mut handles = self.handles.lock();
        let mut states = self.workers.lock();
        for index in 0..workers {
            let label = if workers == 1 {
                self.shared.name.clone()
            } else {
                format!("{}-{index}", self.shared.name)
            };
            let worker_state = TaskState::new(label.clone());
            let shared = Arc::clone(&self.shared);
            let thread_state = worker_state.clone();
            let work = Arc::clone(&work);
            let spawned = thread::Builder::new().name(label.clone()).spawn(move || {
                run_worker(&shared, &thread_state, &label, index, work.as_ref());
            });
            match spawned {
                Ok(handle) => {
                    handles.push(handle);
                    states.push(worker_state);
                }
                Err(error) => {
                    self.shared.failures.lock().push(ShpError::Io(error));
                    self.shared.token.cancel();
                    self.shared.workers_exited(workers - index);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Wait for every worker to exit and report the classified outcome.
    ///
    /// Cancellation is not an error: a canceled stage returns `Ok(TaskStatus::Canceled)`.
    ///
    /// # Errors
    /// Returns `ShpError::Faulted` carrying every worker failure if the stage faulted.
    pub fn join(&self) -> Result<TaskStatus> {
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(payload) = handle.join() {
                self.shared.failures.lock().push(ShpError::WorkerPanic {
                    worker: self.shared.name.clone(),
                    message: extract_panic_message(payload),
                });
            }
        }
        match self.shared.state.status() {
            TaskStatus::Faulted => Err(ShpError::Faulted {
                stage: self.shared.name.clone(),
                errors: std::mem::take(&mut *self.shared.failures.lock()),
            }),
            status => Ok(status),
        }
    }
}

/// Lifecycle operations shared by every pipeline stage.
///
/// Implementors provide their [`StageControl`] and how to launch their workers; the
/// remaining operations default to the control's. Composite stages override them to cover
/// every stage they own.
pub trait Stage {
    /// The stage's lifecycle capability.
    fn control(&self) -> &StageControl;

    /// Launch the stage's workers without waiting for them.
    ///
    /// # Errors
    /// Returns an error if the stage cannot be launched (e.g., it was already started).
    fn start(&self) -> Result<()>;

    /// Wait for the stage to finish; see [`StageControl::join`].
    ///
    /// # Errors
    /// Returns the stage's aggregated failure if it faulted.
    fn join(&self) -> Result<TaskStatus> {
        self.control().join()
    }

    /// Start the stage and wait for it to finish.
    ///
    /// # Errors
    /// Returns an error if the stage cannot be launched or faulted.
    fn run(&self) -> Result<TaskStatus> {
        self.start()?;
        self.join()
    }

    /// Handle to the stage state that downstream stages monitor.
    fn state(&self) -> TaskState {
        self.control().state()
    }

    fn status(&self) -> TaskStatus {
        self.control().status()
    }

    /// Request cooperative cancellation. Idempotent.
    fn cancel(&self) {
        self.control().cancel();
    }

    fn worker_counts(&self) -> WorkerCounts {
        self.control().worker_counts()
    }
}

impl Drop for StageControl {
    fn drop(&mut self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return;
        }
        self.shared.token.cancel();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn run_worker<F>(shared: &StageShared, state: &TaskState, label: &str, index: usize, work: &F)
where
    F: Fn(usize, &CancellationToken) -> WorkResult,
{
    state.start();
    let outcome =
        panic::catch_unwind(AssertUnwindSafe(|| work(index, &shared.token))).unwrap_or_else(
            |payload| {
                Err(Interrupt::Failed(ShpError::WorkerPanic {
                    worker: label.to_string(),
                    message: extract_panic_message(payload),
                }))
            },
        );
    let status = match outcome {
        Ok(()) => TaskStatus::RanToCompletion,
        Err(Interrupt::Cancelled) => {
            shared.cancelled.fetch_add(1, Ordering::AcqRel);
            TaskStatus::Canceled
        }
        Err(Interrupt::Failed(error)) => {
            debug!("Worker '{label}' failed: {error}");
            shared.failures.lock().push(error);
            shared.token.cancel();
            TaskStatus::Faulted
        }
    };
    state.finish(status);
    shared.workers_exited(1);
}

/// Combine the joined outcomes of several stages into one.
///
/// Every outcome is inspected, so callers should join all stages before merging. A single
/// failure is returned unchanged; several are wrapped in a `Faulted` aggregate named `stage`.
/// Without failures the result is `Canceled` if any stage was canceled, otherwise the
/// least-advanced status.
///
/// # Errors
/// Returns the failure(s) carried by `outcomes`.
pub fn merge_outcomes(
    stage: &str,
    outcomes: impl IntoIterator<Item = Result<TaskStatus>>,
) -> Result<TaskStatus> {
    let mut errors = Vec::new();
    let mut canceled = false;
    let mut merged = TaskStatus::RanToCompletion;
    for outcome in outcomes {
        match outcome {
            Ok(TaskStatus::Canceled) => canceled = true,
            Ok(TaskStatus::RanToCompletion) => {}
            Ok(status) => merged = status,
            Err(error) => errors.push(error),
        }
    }
    match errors.len() {
        0 if canceled => Ok(TaskStatus::Canceled),
        0 => Ok(merged),
        1 => Err(errors.remove(0)),
        _ => Err(ShpError::Faulted { stage: stage.to_string(), errors }),
    }
}
