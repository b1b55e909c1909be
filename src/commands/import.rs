//! Import a map: join its geometry file with its attribute file and persist the records.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use log::{debug, info, warn};

use shpjoin_lib::attributes::AttributeReaderConfig;
use shpjoin_lib::correlator::CorrelatorConfig;
use shpjoin_lib::exporter::{ExportConfig, MapExporter};
use shpjoin_lib::importer::{ImportConfig, MapImporter};
use shpjoin_lib::logging::{OperationTimer, format_count};
use shpjoin_lib::record::RecordPositions;
use shpjoin_lib::shapefile::ShapefileReaderConfig;
use shpjoin_lib::task::TaskStatus;

use crate::commands::command::Command;
use crate::commands::common::{ColumnOptions, MapPathOptions};

/// Import `<name>.shp` and `<name>.csv` into `<name>.geomap`.
#[derive(Debug, Parser)]
#[command(
    name = "import",
    about = "\x1b[38;5;30m[IMPORT]\x1b[0m       \x1b[36mJoin geometries with attributes and persist the records\x1b[0m",
    long_about = r#"
Join a binary geometry file with its delimited attribute file and persist the joined records.

The geometry file `<geometry-dir>/<name>.shp` is read record by record, and the attribute file
`<attribute-dir>/<name>.csv` line by line (its first line is a header and is skipped). The n-th
geometry is joined with the n-th attribute line. Three attribute columns are kept: the primary
id, the secondary id and the name. Ids that do not parse as integers become 0.

Records are written one per line to `<output-dir>/<name>.geomap`, replacing any existing file.

Supported shape types are Null (0), Point (1), PolyLine (3), Polygon (5) and Multipoint (8); any
other type aborts the import. Undecodable records are skipped up to --corrupt-tolerance.

Example usage:
  shpjoin import -g maps/shp -a maps/csv -o maps/out -n counties \
      --primary-id-column 3 --secondary-id-column 4 --name-column 1
  shpjoin import -g maps/shp -a maps/csv -o maps/out -n counties \
      --primary-id-column 0 --secondary-id-column 1 --name-column 2 --simplify-tolerance 0.001
"#
)]
pub struct Import {
    /// Input and output locations
    #[command(flatten)]
    pub paths: MapPathOptions,

    /// Attribute columns
    #[command(flatten)]
    pub columns: ColumnOptions,

    /// Delimiter separating attribute columns
    #[arg(long = "delimiter", default_value = ",")]
    pub delimiter: char,

    /// Threads splitting attribute lines (more than one may misalign rows with geometries)
    #[arg(long = "split-threads", default_value = "1")]
    pub split_threads: usize,

    /// Threads serializing records
    #[arg(long = "serialize-threads", default_value = "1")]
    pub serialize_threads: usize,

    /// Abort reading geometries after this long without a decoded record
    #[arg(long = "stall-timeout-ms", default_value = "1000")]
    pub stall_timeout_ms: u64,

    /// Undecodable geometry records to skip before aborting
    #[arg(long = "corrupt-tolerance", default_value = "1")]
    pub corrupt_tolerance: u64,

    /// Thin each record's points with this Ramer-Douglas-Peucker tolerance
    #[arg(long = "simplify-tolerance")]
    pub simplify_tolerance: Option<f64>,
}

impl Import {
    fn import_config(&self) -> ImportConfig {
        ImportConfig::default()
            .with_reader(
                ShapefileReaderConfig::default()
                    .with_stall_timeout(Duration::from_millis(self.stall_timeout_ms))
                    .with_corrupt_tolerance(self.corrupt_tolerance),
            )
            .with_attributes(
                AttributeReaderConfig::default()
                    .with_delimiter(self.delimiter)
                    .with_split_workers(self.split_threads),
            )
            .with_correlator(CorrelatorConfig::default().with_simplify_tolerance(self.simplify_tolerance))
    }
}

impl Command for Import {
    fn execute(&self, command_line: &str) -> Result<()> {
        debug!("Command line: {command_line}");
        if let Some(tolerance) = self.simplify_tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                bail!("--simplify-tolerance must be a non-negative number, got {tolerance}");
            }
        }
        if self.stall_timeout_ms == 0 {
            bail!("--stall-timeout-ms must be greater than 0");
        }
        let paths = self.paths.validate()?;
        let positions = RecordPositions::new(
            self.columns.primary_id_column,
            self.columns.secondary_id_column,
            self.columns.name_column,
        );

        let timer = OperationTimer::new("Importing map");

        info!("Starting Import");
        info!("Geometry file: {}", paths.geometry_path().display());
        info!("Attribute file: {}", paths.attribute_path().display());
        info!("Output file: {}", paths.export_path().display());
        info!(
            "Columns: primary id {}, secondary id {}, name {}",
            positions.primary_id_index, positions.secondary_id_index, positions.name_index
        );
        if let Some(tolerance) = self.simplify_tolerance {
            info!("Simplification tolerance: {tolerance}");
        }

        let importer = MapImporter::new(&paths, self.import_config())?;
        let exporter = MapExporter::new(
            &paths,
            ExportConfig::default().with_serialize_workers(self.serialize_threads),
        )?;

        // Serialize records as the correlator emits them.
        importer.start(&positions)?;
        exporter.start(importer.records(), importer.records_state())?;
        let imported = importer.wait();
        if imported.is_err() {
            exporter.cancel();
        }
        let exported = exporter.wait();
        let report = imported?;
        let export_status = exported?;

        info!("Geometry records read: {}", format_count(report.geometries_read));
        info!("Attribute rows read: {}", format_count(report.rows_read));
        if let Some(summary) = report.summary.filter(|s| !s.is_complete()) {
            warn!(
                "Only {} of {} records were joined; check that both files describe the same features",
                format_count(summary.emitted),
                format_count(summary.expected)
            );
        }
        if report.status == TaskStatus::Canceled || export_status == TaskStatus::Canceled {
            bail!("Import was canceled");
        }

        info!("Records written: {}", format_count(exporter.records_written()));
        timer.log_completion(exporter.records_written());
        Ok(())
    }
}
