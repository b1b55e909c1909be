//! Reload a persisted record file and summarize its contents.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use log::{debug, info};

use shpjoin_lib::loader::{LoadConfig, MapLoader};
use shpjoin_lib::logging::format_count;
use shpjoin_lib::record::UnifiedRecord;
use shpjoin_lib::task::{CancellationToken, TaskStatus};

use crate::commands::command::Command;

/// Summarize a `.geomap` record file.
#[derive(Debug, Parser)]
#[command(
    name = "inspect",
    about = "\x1b[38;5;72m[UTILITIES]\x1b[0m    \x1b[36mReload a persisted record file and summarize it\x1b[0m",
    long_about = r#"
Reload every record of a persisted record file and log a summary.

The file is read line by line and each line parsed back into a record. Any line that is not a
valid record (including a blank line) fails the command. The summary reports the number of
records, the total and largest point counts, the range of record numbers, and the number of
distinct names.

Example usage:
  shpjoin inspect -i maps/out/counties.geomap
  shpjoin inspect -i maps/out/counties.geomap --threads 8
"#
)]
pub struct Inspect {
    /// Record file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Threads used for reading and parsing
    #[arg(short = 't', long = "threads", default_value = "2")]
    pub threads: usize,
}

/// Aggregate facts about a set of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub records: usize,
    pub points: usize,
    pub max_points: usize,
    pub record_numbers: Option<(i32, i32)>,
    pub distinct_names: usize,
}

impl RecordSummary {
    #[must_use]
    pub fn of(records: &[UnifiedRecord]) -> Self {
        let mut names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        let record_numbers = records.iter().map(|r| r.record_number).fold(None, |range, n| match range {
            None => Some((n, n)),
            Some((lo, hi)) => Some((lo.min(n), hi.max(n))),
        });
        Self {
            records: records.len(),
            points: records.iter().map(|r| r.points.len()).sum(),
            max_points: records.iter().map(|r| r.points.len()).max().unwrap_or(0),
            record_numbers,
            distinct_names: names.len(),
        }
    }
}

impl Command for Inspect {
    fn execute(&self, command_line: &str) -> Result<()> {
        debug!("Command line: {command_line}");
        info!("Inspecting {}", self.input.display());

        let loader =
            MapLoader::new(&self.input, &LoadConfig::default().with_threads(self.threads), &CancellationToken::new())?;
        if loader.load()? == TaskStatus::Canceled {
            bail!("Loading {} was canceled", self.input.display());
        }
        let summary = RecordSummary::of(&loader.take_records());

        info!("Records: {}", format_count(summary.records as u64));
        info!("Points: {} (largest record {})", format_count(summary.points as u64), summary.max_points);
        if let Some((first, last)) = summary.record_numbers {
            info!("Record numbers: {first}..={last}");
        }
        info!("Distinct names: {}", format_count(summary.distinct_names as u64));
        Ok(())
    }
}
