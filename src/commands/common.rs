//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed into
//! command structs using `#[command(flatten)]`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use shpjoin_lib::paths::PathConfig;
use shpjoin_lib::validation::validate_file_exists;

/// Where a map's input files live and where its records are written.
#[derive(Debug, Clone, Args)]
pub struct MapPathOptions {
    /// Directory containing `<name>.shp`
    #[arg(short = 'g', long = "geometry-dir")]
    pub geometry_dir: PathBuf,

    /// Directory containing `<name>.csv`
    #[arg(short = 'a', long = "attribute-dir")]
    pub attribute_dir: PathBuf,

    /// Directory receiving `<name>.geomap`
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: PathBuf,

    /// Base file name shared by the geometry, attribute and output files
    #[arg(short = 'n', long = "name")]
    pub name: String,
}

impl MapPathOptions {
    /// Validates the directories and checks that both input files exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be used or an input file is missing.
    pub fn validate(&self) -> anyhow::Result<PathConfig> {
        let paths = PathConfig::new(
            &self.geometry_dir,
            &self.attribute_dir,
            &self.output_dir,
            self.name.as_str(),
        )
        .validate()
        .with_context(|| format!("Cannot use the directories for map '{}'", self.name))?;
        validate_file_exists(paths.geometry_path(), "Geometry file")?;
        validate_file_exists(paths.attribute_path(), "Attribute file")?;
        Ok(paths)
    }
}

/// Which attribute columns (0-based) hold the fields of each record.
#[derive(Debug, Clone, Args)]
pub struct ColumnOptions {
    /// Column holding the primary id
    #[arg(long = "primary-id-column")]
    pub primary_id_column: usize,

    /// Column holding the secondary id
    #[arg(long = "secondary-id-column")]
    pub secondary_id_column: usize,

    /// Column holding the record name
    #[arg(long = "name-column")]
    pub name_column: usize,
}
