//! Integration tests for the shpjoin library.
//!
//! These tests run complete pipelines over files written to temporary directories,
//! checking how the stages interact rather than each stage in isolation.

mod helpers;
mod test_cancellation;
mod test_error_paths;
mod test_export_load;
mod test_import_pipeline;
