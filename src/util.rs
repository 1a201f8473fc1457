//! Utility functions

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use glob::glob;
use log::trace;

use crate::toolkit::ToolkitError;

/// Remove a file or a directory tree (toolkit images and tables are directories). A path that
/// doesn't exist is not an error.
///
/// # Errors
///
/// [`ToolkitError::Remove`] if the path exists but can't be removed.
pub fn remove_path<P: AsRef<Path>>(path: P) -> Result<(), ToolkitError> {
    let path = path.as_ref();
    let result = match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|source| ToolkitError::Remove {
        path: path.to_path_buf(),
        source,
    })?;
    trace!("removed {}", path.display());
    Ok(())
}

/// Remove everything in `dir` matching any of the glob `patterns`, returning what was removed.
///
/// Patterns are relative to `dir`; characters in `dir` itself are not treated as glob syntax.
///
/// # Errors
///
/// [`ToolkitError::Remove`] if a match can't be removed.
pub fn remove_matching<P: AsRef<Path>>(
    dir: P,
    patterns: &[String],
) -> Result<Vec<PathBuf>, ToolkitError> {
    let dir = dir.as_ref();
    let escaped_dir = glob::Pattern::escape(&dir.to_string_lossy());
    let mut removed = vec![];
    for pattern in patterns {
        let full_pattern = Path::new(&escaped_dir).join(pattern);
        // an invalid pattern matches nothing
        let Ok(entries) = glob(&full_pattern.to_string_lossy()) else {
            continue;
        };
        for path in entries.flatten() {
            remove_path(&path)?;
            removed.push(path);
        }
    }
    Ok(removed)
}
