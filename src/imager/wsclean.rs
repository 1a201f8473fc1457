use log::warn;

use super::{Imager, ImagerConfig, ImagerError};
use crate::stats::ReconstructionStatistics;

/// Placeholder for imaging with WSClean. Runs do nothing and never produce statistics.
pub struct WsClean {
    config: ImagerConfig,
}

impl WsClean {
    /// Create a new placeholder imager
    pub fn new(config: ImagerConfig) -> Self {
        Self { config }
    }
}

impl Imager for WsClean {
    fn config(&self) -> &ImagerConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut ImagerConfig {
        &mut self.config
    }

    fn run(&mut self, imagename: &str) -> Result<(), ImagerError> {
        warn!("wsclean imaging is not implemented, skipping {}", imagename);
        Ok(())
    }

    fn statistics(&self) -> Option<&ReconstructionStatistics> {
        None
    }
}
