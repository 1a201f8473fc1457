//! Errors that can occur while driving the external toolkit

use std::path::PathBuf;

use thiserror::Error;

use crate::fits::FitsReadError;

#[derive(Error, Debug)]
/// All the errors that can occur when calling into the external toolkit
pub enum ToolkitError {
    /// The toolkit process could not be started at all.
    #[error("couldn't launch {executable} for task {task}: {source}")]
    Launch {
        /// The toolkit executable
        executable: String,
        /// The task being run
        task: String,
        /// The underlying io error
        source: std::io::Error,
    },

    /// The toolkit ran the task, but the task raised or exited non-zero.
    #[error("task {task} failed ({status}):\n{stderr}")]
    TaskFailed {
        /// The task that failed
        task: String,
        /// The exit status, as reported by the os
        status: String,
        /// Whatever the toolkit wrote to stderr
        stderr: String,
    },

    /// A query task finished, but didn't report a result.
    #[error("task {task} didn't report a result")]
    MissingResult {
        /// The query task
        task: String,
    },

    /// A query task reported something we couldn't interpret.
    #[error("couldn't parse result of {task}: {received}")]
    BadResult {
        /// The query task
        task: String,
        /// The text that was received
        received: String,
    },

    /// A quantity carried a unit that can't be converted.
    #[error("can't convert from unit {from} to unit {to}")]
    UnknownUnit {
        /// unit of the quantity
        from: String,
        /// requested unit
        to: String,
    },

    #[error("couldn't remove {path}: {source}")]
    /// Error removing a file or directory on behalf of the toolkit
    Remove {
        /// The path being removed
        path: PathBuf,
        /// The underlying io error
        source: std::io::Error,
    },

    #[error("{0}")]
    /// Error derived from [`FitsReadError`]
    Fits(#[from] FitsReadError),
}
