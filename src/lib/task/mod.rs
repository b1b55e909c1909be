//! Task-state framework shared by every pipeline stage.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── StageControl ────────────────────────────┐
//! │  TaskState (Created → Running → RanToCompletion | Canceled | Faulted) │
//! │  CancellationToken (child of the caller's token)                      │
//! │  worker threads ──► WorkResult = Ok | Interrupt::Cancelled | Failed   │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each stage owns exactly one [`StageControl`]. Worker bodies poll their token at each loop
//! iteration and return a [`WorkResult`](crate::errors::WorkResult); the stage classifies the
//! outcomes when its last worker exits. Cancellation yields `Canceled` and is never reported
//! as an error; any failure yields `Faulted`, is logged with its cause chain, and is returned
//! from [`StageControl::join`].
//!
//! Every worker runs on its own OS thread. Stages block on each other's buffers and states,
//! so sharing a fixed-size pool between them could starve a producer behind its consumers.
//!
//! # Module Structure
//!
//! - `status`: [`TaskStatus`] and the observable [`TaskState`]
//! - `cancellation`: hierarchical [`CancellationToken`]
//! - `stage`: [`StageControl`], the [`Stage`] trait, [`WorkerCounts`], outcome merging

mod cancellation;
mod stage;
mod status;

pub use cancellation::CancellationToken;
pub use stage::{Stage, StageControl, WorkerCounts, extract_panic_message, merge_outcomes};
pub use status::{TaskState, TaskStatus};
