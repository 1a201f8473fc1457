//! Errors that can occur while imaging

use std::path::PathBuf;

use thiserror::Error;

use crate::{stats::StatsError, toolkit::ToolkitError};

#[derive(Error, Debug)]
/// All the errors that can occur in an imager run
pub enum ImagerError {
    #[error("{0}")]
    /// Error derived from [`ToolkitError`]
    Toolkit(#[from] ToolkitError),

    #[error("couldn't derive statistics: {0}")]
    /// Error derived from [`StatsError`]
    Stats(#[from] StatsError),

    /// The external imaging executable couldn't be started.
    #[error("couldn't launch {executable}: {source}")]
    Spawn {
        /// The executable
        executable: String,
        /// The underlying io error
        source: std::io::Error,
    },

    /// The external imaging executable finished unsuccessfully.
    #[error("{executable} finished with {status}, see {stderr_path} for details")]
    ExecutableFailed {
        /// The executable
        executable: String,
        /// The exit status, as reported by the os
        status: String,
        /// Where the executable's stderr was captured
        stderr_path: PathBuf,
    },

    /// A file for the executable's output streams couldn't be created.
    #[error("couldn't create {path}: {source}")]
    OutputFile {
        /// The file being created
        path: PathBuf,
        /// The underlying io error
        source: std::io::Error,
    },

    /// The working directory the solver's relative paths are resolved against is unknown.
    #[error("couldn't read the current directory: {source}")]
    CurrentDir {
        /// The underlying io error
        source: std::io::Error,
    },
}
