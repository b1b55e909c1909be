//! CLI command implementations for shpjoin.
//!
//! # Commands
//!
//! - [`import`] - Join a geometry file with its attribute file and persist the records
//! - [`inspect`] - Reload a persisted record file and summarize it

#![allow(
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod import;
pub mod inspect;
