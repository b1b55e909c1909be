//! Lifecycle status shared by every stage and worker.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::cancellation::CancellationToken;
use crate::errors::{Interrupt, ShpError, WorkResult};

/// Upper bound on a single condition-variable wait, so cancellation is observed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Lifecycle status of a stage or worker.
///
/// Transitions are `Created -> Running -> {RanToCompletion, Canceled, Faulted}`. The three
/// terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Constructed but not started.
    Created,
    /// At least one worker is running.
    Running,
    /// Finished without failure or cancellation.
    RanToCompletion,
    /// Stopped because its cancellation token was raised.
    Canceled,
    /// Stopped because at least one worker failed.
    Faulted,
}

impl TaskStatus {
    /// Returns true for `RanToCompletion`, `Canceled` and `Faulted`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::RanToCompletion | TaskStatus::Canceled | TaskStatus::Faulted)
    }

    /// Status of a group of stages: `Faulted` if any faulted, `Running` until all are
    /// terminal, then `Canceled` if any was canceled, otherwise `RanToCompletion`.
    ///
    /// An empty group counts as `RanToCompletion`.
    #[must_use]
    pub fn combine(statuses: impl IntoIterator<Item = TaskStatus>) -> TaskStatus {
        let statuses: Vec<TaskStatus> = statuses.into_iter().collect();
        if statuses.contains(&TaskStatus::Faulted) {
            TaskStatus::Faulted
        } else if statuses.iter().all(|s| *s == TaskStatus::Created) && !statuses.is_empty() {
            TaskStatus::Created
        } else if !statuses.iter().all(|s| s.is_terminal()) {
            TaskStatus::Running
        } else if statuses.contains(&TaskStatus::Canceled) {
            TaskStatus::Canceled
        } else {
            TaskStatus::RanToCompletion
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Created => "created",
            TaskStatus::Running => "running",
            TaskStatus::RanToCompletion => "ran to completion",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

struct StateInner {
    name: String,
    status: Mutex<TaskStatus>,
    changed: Condvar,
}

/// A shared, observable lifecycle state.
///
/// Cloning yields another handle to the same state, which is how downstream stages monitor
/// their upstream: they hold a clone and poll [`TaskState::is_terminal`] or block in
/// [`TaskState::wait_until_started`].
#[derive(Clone)]
pub struct TaskState {
    inner: Arc<StateInner>,
}

impl TaskState {
    /// Create a new state in `Created`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(StateInner {
                name: name.into(),
                status: Mutex::new(TaskStatus::Created),
                changed: Condvar::new(),
            }),
        }
    }

    /// The name this state was created with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        *self.inner.status.lock()
    }

    /// Returns true once a terminal status has been reached.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Move from `Created` to `Running`.
    ///
    /// Returns `false` (and changes nothing) from any other status.
    pub fn start(&self) -> bool {
        self.transition(|current| (current == TaskStatus::Created).then_some(TaskStatus::Running))
    }

    /// Move to a terminal status.
    ///
    /// Returns `false` (and changes nothing) if `status` is not terminal or a terminal status
    /// was already reached.
    pub fn finish(&self, status: TaskStatus) -> bool {
        self.transition(|current| {
            (status.is_terminal() && !current.is_terminal()).then_some(status)
        })
    }

    fn transition(&self, next: impl FnOnce(TaskStatus) -> Option<TaskStatus>) -> bool {
        let mut status = self.inner.status.lock();
        match next(*status) {
            Some(new_status) => {
                *status = new_status;
                self.inner.changed.notify_all();
                true
            }
            None => false,
        }
    }

    /// Block until this task has left `Created`.
    ///
    /// # Errors
    /// - `Interrupt::Cancelled` if `token` is raised or the task itself was canceled
    /// - `ShpError::UpstreamFaulted` if the task faulted
    /// - `ShpError::Stalled` if it is still `Created` after `timeout`
    pub fn wait_until_started(
        &self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> WorkResult {
        let deadline = Instant::now() + timeout;
        let mut status = self.inner.status.lock();
        loop {
            match *status {
                TaskStatus::Running | TaskStatus::RanToCompletion => return Ok(()),
                TaskStatus::Canceled => return Err(Interrupt::Cancelled),
                TaskStatus::Faulted => {
                    return Err(ShpError::UpstreamFaulted { stage: self.inner.name.clone() }.into());
                }
                TaskStatus::Created => {}
            }
            token.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Err(ShpError::Stalled {
                    stage: format!("Waiting for '{}' to start", self.inner.name),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .into());
            }
            self.inner.changed.wait_for(&mut status, (deadline - now).min(WAIT_SLICE));
        }
    }

    /// Block until a terminal status is reached or `timeout` elapses.
    ///
    /// Returns the status observed when the wait ended.
    pub fn wait_until_terminal(&self, timeout: Duration) -> TaskStatus {
        let deadline = Instant::now() + timeout;
        let mut status = self.inner.status.lock();
        while !status.is_terminal() {
            if self.inner.changed.wait_until(&mut status, deadline).timed_out() {
                break;
            }
        }
        *status
    }
}

impl fmt::Debug for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskState")
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}
