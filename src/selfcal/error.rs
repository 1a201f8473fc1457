//! Errors that can occur in the self-calibration loop

use thiserror::Error;

use super::SelfcalState;
use crate::{imager::ImagerError, toolkit::ToolkitError};

#[derive(Error, Debug)]
/// All the errors that can occur in the self-calibration loop
pub enum SelfcalLoopError {
    /// A loop can only be run from [`SelfcalState::Idle`]. Reset it first.
    #[error("a self-calibration loop can't be started while {state}, reset it first")]
    NotIdle {
        /// the state the loop was in
        state: SelfcalState,
    },

    #[error("{0}")]
    /// Error derived from [`ToolkitError`]
    Toolkit(#[from] ToolkitError),

    #[error("{0}")]
    /// Error derived from [`ImagerError`]
    Imager(#[from] ImagerError),
}
