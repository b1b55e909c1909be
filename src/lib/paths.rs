//! File locations for an import/export run.

use std::path::{Path, PathBuf};

use crate::errors::{Result, ShpError};
use crate::record::RECORD_FILE_EXTENSION;
use crate::validation::validate_path_config;

/// Extension of the binary geometry file.
pub const GEOMETRY_FILE_EXTENSION: &str = "shp";

/// Extension of the delimited attribute file.
pub const ATTRIBUTE_FILE_EXTENSION: &str = "csv";

/// Where the inputs of a map live and where its records are persisted.
///
/// The geometry file is `geometry_dir/<file_name>.shp`, the attribute file is
/// `attribute_dir/<file_name>.csv`, and the export is `output_dir/<file_name>.geomap`.
///
/// A `PathConfig` must pass [`PathConfig::validate`] before any pipeline component accepts it.
///
/// # Example
/// ```no_run
/// use shpjoin_lib::paths::PathConfig;
///
/// # fn main() -> shpjoin_lib::errors::Result<()> {
/// let paths = PathConfig::new("data/shapes", "data/attributes", "out", "counties").validate()?;
/// assert!(paths.is_validated());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    geometry_dir: PathBuf,
    attribute_dir: PathBuf,
    output_dir: PathBuf,
    file_name: String,
    validated: bool,
}

impl PathConfig {
    #[must_use]
    pub fn new(
        geometry_dir: impl Into<PathBuf>,
        attribute_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            geometry_dir: geometry_dir.into(),
            attribute_dir: attribute_dir.into(),
            output_dir: output_dir.into(),
            file_name: file_name.into(),
            validated: false,
        }
    }

    /// Verify (creating where missing) every directory and check the output is writable.
    ///
    /// # Errors
    /// Returns `InvalidPath` or `InvalidParameter` describing the first problem found.
    pub fn validate(mut self) -> Result<Self> {
        validate_path_config(&self)?;
        self.validated = true;
        Ok(self)
    }

    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Constructor guard for pipeline components.
    ///
    /// # Errors
    /// Returns `UnvalidatedPaths` if [`PathConfig::validate`] was never called.
    pub fn ensure_validated(&self) -> Result<()> {
        if self.validated {
            Ok(())
        } else {
            Err(ShpError::UnvalidatedPaths { file_name: self.file_name.clone() })
        }
    }

    #[must_use]
    pub fn geometry_dir(&self) -> &Path {
        &self.geometry_dir
    }

    #[must_use]
    pub fn attribute_dir(&self) -> &Path {
        &self.attribute_dir
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn geometry_path(&self) -> PathBuf {
        self.geometry_dir.join(format!("{}.{GEOMETRY_FILE_EXTENSION}", self.file_name))
    }

    #[must_use]
    pub fn attribute_path(&self) -> PathBuf {
        self.attribute_dir.join(format!("{}.{ATTRIBUTE_FILE_EXTENSION}", self.file_name))
    }

    #[must_use]
    pub fn export_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.{RECORD_FILE_EXTENSION}", self.file_name))
    }
}
