//! Input validation utilities
//!
//! Directory, file and parameter checks with consistent, structured errors from
//! [`crate::errors`]. [`PathConfig::validate`](crate::paths::PathConfig::validate) runs
//! [`validate_path_config`] and is the only way to obtain a validated configuration.

use std::fs;
use std::path::{MAIN_SEPARATOR, Path};

use log::debug;

use crate::errors::{Result, ShpError};
use crate::paths::PathConfig;

fn invalid_path(path: &Path, description: &str, reason: impl Into<String>) -> ShpError {
    ShpError::InvalidPath {
        description: description.to_string(),
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Validate that a file exists
///
/// # Errors
/// Returns `InvalidPath` if `path` does not exist or is not a regular file
///
/// # Example
/// ```
/// use shpjoin_lib::validation::validate_file_exists;
///
/// let result = validate_file_exists("/nonexistent/counties.shp", "Geometry file");
/// assert!(result.is_err());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(invalid_path(path, description, "File does not exist"));
    }
    if !path.is_file() {
        return Err(invalid_path(path, description, "Not a regular file"));
    }
    Ok(())
}

/// Verify that `path` is a directory, creating it (and its parents) if it does not exist.
///
/// # Errors
/// Returns `InvalidPath` if the path is empty, names a non-directory, or cannot be created
pub fn verify_working_directory<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(invalid_path(path, description, "Path is empty"));
    }
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(invalid_path(path, description, "Exists but is not a directory"));
    }
    fs::create_dir_all(path)
        .map_err(|e| invalid_path(path, description, format!("Could not be created: {e}")))?;
    debug!("Created {description} {}", path.display());
    Ok(())
}

/// Verify that new files can be created in `dir`.
///
/// A uniquely named probe file is created and removed again.
///
/// # Errors
/// Returns `InvalidPath` if the probe file cannot be created
pub fn verify_write_access<P: AsRef<Path>>(dir: P, description: &str) -> Result<()> {
    let dir = dir.as_ref();
    tempfile::Builder::new()
        .prefix(".shpjoin-probe")
        .tempfile_in(dir)
        .map(drop)
        .map_err(|e| invalid_path(dir, description, format!("No write access: {e}")))
}

/// Validate a base file name (no extension, no directory components).
///
/// # Errors
/// Returns `InvalidParameter` if the name is blank or contains a path separator
///
/// # Example
/// ```
/// use shpjoin_lib::validation::validate_file_name;
///
/// assert!(validate_file_name("tl_2019_16_cousub").is_ok());
/// assert!(validate_file_name("../escape").is_err());
/// ```
pub fn validate_file_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("File name must not be blank".to_string())
    } else if name.contains('/') || name.contains(MAIN_SEPARATOR) {
        Some(format!("File name must not contain a path separator, got: '{name}'"))
    } else if name == "." || name == ".." {
        Some(format!("File name must not be a relative directory, got: '{name}'"))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ShpError::InvalidParameter { parameter: "file name".to_string(), reason }),
        None => Ok(()),
    }
}

/// Validate that a worker count is at least 1
///
/// # Errors
/// Returns `InvalidParameter` if `count` is zero
pub fn validate_worker_count(count: usize, name: &str) -> Result<()> {
    if count == 0 {
        return Err(ShpError::InvalidParameter {
            parameter: name.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Validate every location of a [`PathConfig`].
///
/// Each directory is verified or created, then the output directory is checked for write
/// access.
///
/// # Errors
/// Returns the first validation failure
pub fn validate_path_config(paths: &PathConfig) -> Result<()> {
    validate_file_name(paths.file_name())?;
    verify_working_directory(paths.geometry_dir(), "geometry directory")?;
    verify_working_directory(paths.attribute_dir(), "attribute directory")?;
    verify_working_directory(paths.output_dir(), "output directory")?;
    verify_write_access(paths.output_dir(), "output directory")
}
