//! Generic consumer pool: apply an operation to every item of an input buffer.
//!
//! A [`ConsumerPool`] runs `workers` threads that pop from the input buffer, apply the
//! operation and push each result to the output buffer. Exit behavior depends on
//! `wait_for_items`:
//!
//! - `false`: a worker exits as soon as the input buffer is observed empty
//! - `true`: a worker keeps polling while any monitored upstream stage is not terminal, and
//!   exits once every monitored stage is terminal and the input buffer is empty. With no
//!   monitored stages it keeps polling until canceled.
//!
//! An operation error faults the pool and cancels its sibling workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::errors::{Result, WorkResult};
use crate::progress::StageProgress;
use crate::queue::SharedBuffer;
use crate::task::{CancellationToken, Stage, StageControl, TaskState};

/// Operation applied by a [`ConsumerPool`] to each item.
pub type Operation<I, O> = Arc<dyn Fn(I) -> Result<O> + Send + Sync>;

/// Configuration for [`ConsumerPool`].
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Keep polling while monitored upstream stages are still running.
    pub wait_for_items: bool,
    /// How long a worker blocks on an empty input buffer before re-checking its exit condition.
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { workers: 1, wait_for_items: false, poll_interval: Duration::from_millis(10) }
    }
}

impl ConsumerConfig {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self { workers, ..Self::default() }
    }

    #[must_use]
    pub fn with_wait_for_items(mut self, wait_for_items: bool) -> Self {
        self.wait_for_items = wait_for_items;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// A pool of workers transforming items from one buffer into another.
pub struct ConsumerPool<I, O> {
    input: SharedBuffer<I>,
    output: SharedBuffer<O>,
    operation: Operation<I, O>,
    workers: usize,
    poll_interval: Duration,
    wait_for_items: Arc<AtomicBool>,
    monitored: Vec<TaskState>,
    control: StageControl,
    consumed: Arc<StageProgress>,
}

impl<I, O> ConsumerPool<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Create a pool named `name` whose token is a child of `parent`.
    #[must_use]
    pub fn new(
        name: &str,
        input: SharedBuffer<I>,
        output: SharedBuffer<O>,
        operation: Operation<I, O>,
        config: &ConsumerConfig,
        parent: &CancellationToken,
    ) -> Self {
        let control = StageControl::new(name, parent);
        let consumed = Arc::new(StageProgress::new(format!("{name}: items consumed"), control.state()));
        Self {
            input,
            output,
            operation,
            workers: config.workers,
            poll_interval: config.poll_interval,
            wait_for_items: Arc::new(AtomicBool::new(config.wait_for_items)),
            monitored: Vec::new(),
            control,
            consumed,
        }
    }

    /// Upstream stages whose completion ends the wait for more items.
    #[must_use]
    pub fn with_monitored(mut self, monitored: Vec<TaskState>) -> Self {
        self.monitored = monitored;
        self
    }

    /// Toggle waiting for items; takes effect at the workers' next poll.
    pub fn set_wait_for_items(&self, wait_for_items: bool) {
        self.wait_for_items.store(wait_for_items, Ordering::Release);
    }

    #[must_use]
    pub fn wait_for_items(&self) -> bool {
        self.wait_for_items.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn input(&self) -> SharedBuffer<I> {
        Arc::clone(&self.input)
    }

    #[must_use]
    pub fn output(&self) -> SharedBuffer<O> {
        Arc::clone(&self.output)
    }

    #[must_use]
    pub fn items_consumed(&self) -> u64 {
        self.consumed.done()
    }

    #[must_use]
    pub fn progress(&self) -> &Arc<StageProgress> {
        &self.consumed
    }
}

impl<I, O> Stage for ConsumerPool<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn control(&self) -> &StageControl {
        &self.control
    }

    fn start(&self) -> Result<()> {
        let worker = ConsumerWorker {
            input: Arc::clone(&self.input),
            output: Arc::clone(&self.output),
            operation: Arc::clone(&self.operation),
            poll_interval: self.poll_interval,
            wait_for_items: Arc::clone(&self.wait_for_items),
            monitored: self.monitored.clone(),
            consumed: Arc::clone(&self.consumed),
        };
        self.control.launch(self.workers, move |_, token| worker.run(token))
    }
}

struct ConsumerWorker<I, O> {
    input: SharedBuffer<I>,
    output: SharedBuffer<O>,
    operation: Operation<I, O>,
    poll_interval: Duration,
    wait_for_items: Arc<AtomicBool>,
    monitored: Vec<TaskState>,
    consumed: Arc<StageProgress>,
}

impl<I, O> ConsumerWorker<I, O> {
    fn keep_alive(&self) -> bool {
        self.wait_for_items.load(Ordering::Acquire)
            && (self.monitored.is_empty() || self.monitored.iter().any(|s| !s.is_terminal()))
    }

    fn run(&self, token: &CancellationToken) -> WorkResult {
        loop {
            token.check()?;
            // Sampled before popping: an upstream that finishes after this point has already
            // pushed everything, so the emptiness check below cannot miss its last items.
            let keep_alive = self.keep_alive();
            match self.input.pop_timeout(self.poll_interval) {
                Some(item) => {
                    self.output.push((self.operation)(item)?);
                    self.consumed.record(1);
                }
                None if !keep_alive && self.input.is_empty() => break,
                None => {}
            }
        }
        self.consumed.log_final();
        Ok(())
    }
}
