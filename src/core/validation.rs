//! Validation and naming for output destinations
//!
//! The writer never overwrites an existing file: a target must not exist,
//! must not be a directory, and its parent directory must already exist.

use crate::error::{Result, TrajectoryError};
use std::path::{Path, PathBuf};

/// Marker inserted before the extension of the uncertain twin
pub const UNCERTAIN_SUFFIX: &str = "_uncertain";

/// Check that `path` can be created as a fresh output file
///
/// # Errors
///
/// Returns `InvalidDestination` if the path is a directory, already exists,
/// has no file name, or its parent directory is missing.
///
/// # Examples
///
/// ```
/// use trajectory_rs::core::validation::validate_target;
///
/// let dir = tempfile::TempDir::new().unwrap();
/// assert!(validate_target(dir.path().join("run.traj")).is_ok());
/// assert!(validate_target(dir.path()).is_err()); // a directory
/// assert!(validate_target(dir.path().join("missing/run.traj")).is_err());
/// ```
pub fn validate_target<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if path.is_dir() {
        return Err(TrajectoryError::invalid_destination(
            path,
            "output path must be a file, not a directory",
        ));
    }

    if path.exists() {
        return Err(TrajectoryError::invalid_destination(
            path,
            "file exists; choose a filename that does not exist",
        ));
    }

    if path.file_name().is_none() {
        return Err(TrajectoryError::invalid_destination(
            path,
            "path does not contain a file name",
        ));
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(TrajectoryError::invalid_destination(
            path,
            format!("{} does not appear to be a valid directory", parent.display()),
        ));
    }

    Ok(())
}

/// Derive the uncertain twin of a primary output path
///
/// Inserts `_uncertain` between the file stem and the extension:
/// `run.nc` becomes `run_uncertain.nc`, `out/run` becomes `out/run_uncertain`.
pub fn uncertain_path<P: AsRef<Path>>(primary: P) -> PathBuf {
    let primary = primary.as_ref();
    let stem = primary
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file_name = match primary.extension() {
        Some(ext) => format!("{}{}.{}", stem, UNCERTAIN_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, UNCERTAIN_SUFFIX),
    };

    primary.with_file_name(file_name)
}
