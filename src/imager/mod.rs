//! Image reconstruction from visibilities.
//!
//! An [`Imager`] produces a sky image from the visibilities described by its [`ImagerConfig`],
//! and, as a side effect of every successful [`Imager::run`], recomputes its
//! [`ReconstructionStatistics`] from the restored image and its residual.
//!
//! There are three imagers:
//! - [`Clean`] hands the whole reconstruction to the toolkit's `tclean`.
//! - [`GpuVmem`] runs the external `gpuvmem` executable, then restores its model with the
//!   toolkit.
//! - [`WsClean`] is a placeholder, its run does nothing.
//!
//! # Examples
//!
//! ```rust,no_run
//! use selfcal::{
//!     casa::CasaToolkit,
//!     imager::{Clean, CleanParamsBuilder, Imager, ImagerConfigBuilder},
//!     toolkit::Deconvolver,
//! };
//!
//! let casa = CasaToolkit::default();
//! let config = ImagerConfigBuilder::default()
//!     .inputvis("obs.ms")
//!     .output("obs")
//!     .cell("0.05arcsec")
//!     .robust(0.5)
//!     .build()
//!     .unwrap();
//! let params = CleanParamsBuilder::default()
//!     .deconvolver(Deconvolver::Mtmfs)
//!     .nterms(2_i64)
//!     .build()
//!     .unwrap();
//!
//! let mut clean = Clean::new(config, params, &casa);
//! clean.run("obs_dirty").unwrap();
//! println!("psnr: {:?}", clean.psnr());
//! ```

mod clean;
pub mod error;
mod gpuvmem;
mod wsclean;

use derive_builder::Builder;

use crate::{
    stats::{ReconstructionStatistics, DEFAULT_STDV_PIXELS},
    toolkit::Toolkit,
};

pub use clean::{Clean, CleanParams, CleanParamsBuilder};
pub use error::ImagerError;
pub use gpuvmem::{GpuVmem, GpuVmemCommand, GpuVmemParams, GpuVmemParamsBuilder};
pub use wsclean::WsClean;

/// Parameters shared by every imager.
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(default, setter(into))]
pub struct ImagerConfig {
    /// The visibilities to image
    pub inputvis: String,
    /// Output path, the stem of the image names used by self-calibration
    pub output: String,
    /// Cell size, e.g. `"0.1arcsec"`
    pub cell: String,
    /// Briggs robust parameter
    pub robust: f64,
    /// field selection
    pub field: String,
    /// spectral window selection
    pub spw: String,
    /// polarization products to image
    pub stokes: String,
    /// visibility column to image
    pub datacolumn: String,
    /// image size in pixels, `(M, N)`
    pub imsize: (usize, usize),
    /// maximum number of iterations
    pub niter: i64,
    /// save the model so it can be calibrated against
    pub savemodel: bool,
    /// verbose output from the imaging engine
    pub verbose: bool,
    /// side length of the residual box used to measure the noise
    pub stdv_pixels: usize,
}

impl Default for ImagerConfig {
    fn default() -> Self {
        Self {
            inputvis: String::new(),
            output: String::new(),
            cell: String::new(),
            robust: 2.0,
            field: String::new(),
            spw: String::new(),
            stokes: "I".into(),
            datacolumn: "corrected".into(),
            imsize: (512, 512),
            niter: 100,
            savemodel: true,
            verbose: true,
            stdv_pixels: DEFAULT_STDV_PIXELS,
        }
    }
}

/// Something that reconstructs an image from visibilities.
pub trait Imager {
    /// The shared configuration
    fn config(&self) -> &ImagerConfig;

    /// The shared configuration, for modification between runs
    fn config_mut(&mut self) -> &mut ImagerConfig;

    /// Reconstruct an image named after `imagename`, then recompute the statistics.
    ///
    /// # Errors
    ///
    /// Any failure from the toolkit or external executable, unchanged. The statistics of a
    /// previous run are left as they were.
    fn run(&mut self, imagename: &str) -> Result<(), ImagerError>;

    /// The statistics of the last successful run, `None` before the first one.
    fn statistics(&self) -> Option<&ReconstructionStatistics>;

    /// The visibilities being imaged
    fn vis(&self) -> &str {
        &self.config().inputvis
    }

    /// Image different visibilities
    fn set_vis(&mut self, inputvis: &str) {
        self.config_mut().inputvis = inputvis.to_string();
    }

    /// cell size
    fn cell(&self) -> &str {
        &self.config().cell
    }

    /// set the cell size
    fn set_cell(&mut self, cell: &str) {
        self.config_mut().cell = cell.to_string();
    }

    /// Briggs robust parameter
    fn robust(&self) -> f64 {
        self.config().robust
    }

    /// set the Briggs robust parameter
    fn set_robust(&mut self, robust: f64) {
        self.config_mut().robust = robust;
    }

    /// field selection
    fn field(&self) -> &str {
        &self.config().field
    }

    /// set the field selection
    fn set_field(&mut self, field: &str) {
        self.config_mut().field = field.to_string();
    }

    /// spectral window selection
    fn spw(&self) -> &str {
        &self.config().spw
    }

    /// set the spectral window selection
    fn set_spw(&mut self, spw: &str) {
        self.config_mut().spw = spw.to_string();
    }

    /// polarization products
    fn stokes(&self) -> &str {
        &self.config().stokes
    }

    /// set the polarization products
    fn set_stokes(&mut self, stokes: &str) {
        self.config_mut().stokes = stokes.to_string();
    }

    /// image size in pixels, `(M, N)`
    fn imsize(&self) -> (usize, usize) {
        self.config().imsize
    }

    /// set the image size in pixels
    fn set_imsize(&mut self, m: usize, n: usize) {
        self.config_mut().imsize = (m, n);
    }

    /// whether the model is saved
    fn savemodel(&self) -> bool {
        self.config().savemodel
    }

    /// set whether the model is saved
    fn set_savemodel(&mut self, savemodel: bool) {
        self.config_mut().savemodel = savemodel;
    }

    /// verbosity
    fn verbose(&self) -> bool {
        self.config().verbose
    }

    /// set the verbosity
    fn set_verbose(&mut self, verbose: bool) {
        self.config_mut().verbose = verbose;
    }

    /// The output path
    fn output_path(&self) -> &str {
        &self.config().output
    }

    /// peak signal to noise ratio of the last run
    fn psnr(&self) -> Option<f64> {
        self.statistics().map(|s| s.psnr)
    }

    /// peak of the last restored image
    fn peak(&self) -> Option<f64> {
        self.statistics().map(|s| s.peak)
    }

    /// noise of the last residual image
    fn stdv(&self) -> Option<f64> {
        self.statistics().map(|s| s.stdv)
    }
}

/// Read a restored / residual image pair back through the toolkit and derive statistics.
pub(crate) fn image_statistics(
    toolkit: &dyn Toolkit,
    signal: &str,
    residual: &str,
    stdv_pixels: usize,
) -> Result<ReconstructionStatistics, ImagerError> {
    let signal_pixels = toolkit.image_pixels(signal)?;
    let residual_pixels = toolkit.image_pixels(residual)?;
    Ok(ReconstructionStatistics::from_images(
        signal_pixels.view(),
        residual_pixels.view(),
        stdv_pixels,
    )?)
}
