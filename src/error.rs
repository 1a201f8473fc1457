//! Errors that can occur in selfcal

use thiserror::Error;

use crate::{imager::ImagerError, selfcal::SelfcalLoopError, toolkit::ToolkitError};

#[derive(Error, Debug)]
/// Errors relating to the command line
pub enum CLIError {
    #[error("Invalid Command Line Argument {option}. Expected {expected}, received {received}")]
    /// when the user provides an argument that can't be used
    InvalidCommandLineArgument {
        /// The argument name
        option: String,
        /// Description of what was expected
        expected: String,
        /// What was received
        received: String,
    },
}

#[derive(Error, Debug)]
/// All the errors that can occur in selfcal
pub enum SelfcalError {
    #[error("{0}")]
    /// Error derived from [`ToolkitError`]
    ToolkitError(#[from] ToolkitError),

    #[error("{0}")]
    /// Error derived from [`ImagerError`]
    ImagerError(#[from] ImagerError),

    #[error("{0}")]
    /// Error derived from [`SelfcalLoopError`]
    SelfcalLoopError(#[from] SelfcalLoopError),

    #[cfg(feature = "cli")]
    #[error("{0}")]
    /// Error derived from `clap::Error`
    ClapError(#[from] clap::Error),

    #[error("{0}")]
    /// Error derived from [`CLIError`]
    CLIError(#[from] CLIError),

    #[error("Dry run, nothing was done")]
    /// The user only asked for a summary
    DryRun {},
}
