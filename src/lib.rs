#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! Selfcal is a library for self-calibrating radio interferometric observations: alternating
//! image reconstruction with antenna gain solving until the image stops improving.
//!
//! The numerical work is done by external programs. Imaging, gain solving and image
//! manipulation are tasks of an astronomical data processing toolkit (CASA), reached through the
//! [`toolkit::Toolkit`] trait, and one of the imagers runs the external `gpuvmem` solver. This
//! crate sequences those tasks, names their products, and measures how good each image is.
//!
//! # Examples
//!
//! Two rounds of phase self-calibration, imaging with `tclean`, then write out the calibrated
//! visibilities.
//!
//! ```rust,no_run
//! use selfcal::{
//!     casa::CasaToolkit,
//!     imager::{Clean, CleanParams, Imager, ImagerConfigBuilder},
//!     selfcal::{Selfcal, SelfcalConfigBuilder},
//! };
//!
//! let casa = CasaToolkit::default();
//!
//! let imager_config = ImagerConfigBuilder::default()
//!     .inputvis("obs.ms")
//!     .output("obs")
//!     .cell("0.05arcsec")
//!     .imsize((1024, 1024))
//!     .build()
//!     .unwrap();
//! let mut clean = Clean::new(imager_config, CleanParams::default(), &casa);
//!
//! let selfcal_config = SelfcalConfigBuilder::default()
//!     .visfile("obs.ms")
//!     .refant("DA42")
//!     .solint(vec!["inf".to_string(), "60s".to_string()])
//!     .build()
//!     .unwrap();
//!
//! let mut phasecal = Selfcal::phasecal(selfcal_config, &mut clean, &casa);
//! phasecal.run().unwrap();
//! println!("{:?}", phasecal.caltables());
//! println!("{:?}", phasecal.imager().psnr());
//!
//! let calibrated = phasecal.selfcal_output(true).unwrap();
//! assert_eq!(calibrated, "obs.ms.selfcal");
//! ```

use cfg_if::cfg_if;

pub use marlu;
pub use marlu::ndarray;

pub mod casa;
pub mod error;
pub mod fits;
pub mod imager;
pub mod selfcal;
pub mod stats;
pub mod toolkit;
pub mod util;

pub use error::SelfcalError;
pub use imager::{Imager, ImagerConfig, ImagerError};
pub use selfcal::{CalMode, Selfcal, SelfcalConfig, SelfcalLoopError, SelfcalState};
pub use stats::ReconstructionStatistics;
pub use toolkit::{Toolkit, ToolkitError};

cfg_if! {
    if #[cfg(feature = "cli")] {
        pub mod cli;
        pub use cli::SelfcalContext;
    }
}

#[cfg(test)]
pub(crate) mod test_common;
