//! The interface to the external astronomical data processing toolkit.
//!
//! Nothing in this crate grids, deconvolves or solves for gains itself. Every one of those steps
//! is a task in an external toolkit, described here by the [`Toolkit`] trait and a typed bundle of
//! parameters per task. [`crate::casa::CasaToolkit`] is the production implementation; tests use
//! recording fakes.
//!
//! The parameter names follow the toolkit's own keyword names, so that the rendered calls can be
//! read side by side with the toolkit's documentation.

pub mod error;
pub mod quantity;

use std::{fmt::Display, path::Path, str::FromStr};

use crate::ndarray::Array2;

pub use error::ToolkitError;
pub use quantity::{Beam, Quantity};

/// The minor cycle algorithm used by `tclean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deconvolver {
    /// Högbom CLEAN
    #[default]
    Hogbom,
    /// Clark CLEAN
    Clark,
    /// Clark CLEAN with separate Stokes planes
    ClarkStokes,
    /// Multi-scale CLEAN
    Multiscale,
    /// Multi-term (wideband) multi-frequency synthesis
    Mtmfs,
    /// Maximum entropy
    Mem,
}

impl Deconvolver {
    /// The name the toolkit expects
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hogbom => "hogbom",
            Self::Clark => "clark",
            Self::ClarkStokes => "clarkstokes",
            Self::Multiscale => "multiscale",
            Self::Mtmfs => "mtmfs",
            Self::Mem => "mem",
        }
    }

    /// Whether this deconvolver models the sky with more than one Taylor term, in which case the
    /// toolkit suffixes its output images with the term index (`.tt0`, `.tt1`, ...).
    pub fn is_multi_term(&self) -> bool {
        matches!(self, Self::Mtmfs)
    }
}

impl Display for Deconvolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Deconvolver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hogbom" => Ok(Self::Hogbom),
            "clark" => Ok(Self::Clark),
            "clarkstokes" => Ok(Self::ClarkStokes),
            "multiscale" => Ok(Self::Multiscale),
            "mtmfs" => Ok(Self::Mtmfs),
            "mem" => Ok(Self::Mem),
            other => Err(format!("unknown deconvolver {other}")),
        }
    }
}

/// Parameters of the imaging / deconvolution task (`tclean`).
#[derive(Debug, Clone, PartialEq)]
pub struct TcleanParams {
    /// input visibilities
    pub vis: String,
    /// stem of every image the task writes
    pub imagename: String,
    /// field selection
    pub field: String,
    /// spectral window selection
    pub spw: String,
    /// uv-range selection
    pub uvrange: String,
    /// visibility column to image (`data`, `corrected`, `residual`, ...)
    pub datacolumn: String,
    /// spectral definition mode (`mfs`, `cube`, ...)
    pub specmode: String,
    /// polarization products to image
    pub stokes: String,
    /// minor cycle algorithm
    pub deconvolver: Deconvolver,
    /// multi-scale scales (pixels)
    pub scales: Vec<i64>,
    /// number of Taylor terms
    pub nterms: i64,
    /// image size in pixels, `[M, N]`
    pub imsize: [usize; 2],
    /// cell size, e.g. `"0.1arcsec"`
    pub cell: String,
    /// weighting scheme
    pub weighting: String,
    /// Briggs robust parameter
    pub robust: f64,
    /// maximum number of minor cycle iterations
    pub niter: i64,
    /// stopping threshold, e.g. `"0.1mJy"`
    pub threshold: String,
    /// stopping threshold in units of the noise
    pub nsigma: f64,
    /// interactive masking
    pub interactive: bool,
    /// gridding convolution function
    pub gridder: String,
    /// primary beam correction
    pub pbcor: bool,
    /// uv taper
    pub uvtaper: Vec<String>,
    /// where to save the model (`none`, `modelcolumn`, `virtual`)
    pub savemodel: String,
    /// masking mode
    pub usemask: String,
    /// user mask
    pub mask: String,
    /// auto masking: negative threshold
    pub negativethreshold: f64,
    /// auto masking: low noise threshold
    pub lownoisethreshold: f64,
    /// auto masking: noise threshold
    pub noisethreshold: f64,
    /// auto masking: sidelobe threshold
    pub sidelobethreshold: f64,
    /// auto masking: minimum beam fraction
    pub minbeamfrac: f64,
    /// maximum minor cycle iterations per major cycle
    pub cycleniter: i64,
    /// toolkit verbosity
    pub verbose: bool,
}

/// The toolkit's own defaults, used for calls that only care about a handful of parameters.
impl Default for TcleanParams {
    fn default() -> Self {
        Self {
            vis: String::new(),
            imagename: String::new(),
            field: String::new(),
            spw: String::new(),
            uvrange: String::new(),
            datacolumn: "corrected".into(),
            specmode: "mfs".into(),
            stokes: "I".into(),
            deconvolver: Deconvolver::Hogbom,
            scales: vec![],
            nterms: 1,
            imsize: [100, 100],
            cell: "1arcsec".into(),
            weighting: "briggs".into(),
            robust: 0.5,
            niter: 0,
            threshold: "0.0mJy".into(),
            nsigma: 0.0,
            interactive: false,
            gridder: "standard".into(),
            pbcor: false,
            uvtaper: vec![],
            savemodel: "none".into(),
            usemask: "user".into(),
            mask: String::new(),
            negativethreshold: 0.0,
            lownoisethreshold: 1.5,
            noisethreshold: 5.0,
            sidelobethreshold: 3.0,
            minbeamfrac: 0.3,
            cycleniter: -1,
            verbose: false,
        }
    }
}

/// Parameters of the gain solving task (`gaincal`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GaincalParams {
    /// input visibilities
    pub vis: String,
    /// the calibration table to write
    pub caltable: String,
    /// field selection
    pub field: String,
    /// spectral window selection
    pub spw: String,
    /// gain type, e.g. `G` or `T`
    pub gaintype: String,
    /// reference antenna
    pub refant: String,
    /// `p`, `a` or `ap`
    pub calmode: String,
    /// axes to combine across when solving
    pub combine: String,
    /// solution interval
    pub solint: String,
    /// minimum SNR of an acceptable solution
    pub minsnr: f64,
    /// minimum number of baselines per antenna
    pub minblperant: i64,
    /// prior tables to pre-apply when solving
    pub gaintable: Vec<String>,
    /// spectral window map, one entry per prior table
    pub spwmap: Vec<Vec<i64>>,
    /// normalise the amplitude solutions
    pub solnorm: bool,
}

/// Parameters of the calibration application task (`applycal`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplycalParams {
    /// input visibilities, whose corrected column is overwritten
    pub vis: String,
    /// field selection
    pub field: String,
    /// tables to apply, in order
    pub gaintable: Vec<String>,
    /// field selection within the tables
    pub gainfield: String,
    /// spectral window map, one entry per table
    pub spwmap: Vec<Vec<i64>>,
    /// interpolation rule
    pub interp: String,
    /// recalibrate the weights
    pub calwt: bool,
    /// back up the flags before applying
    pub flagbackup: bool,
}

/// Parameters of the calibration table plotting task (`plotcal`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlotcalParams {
    /// table to plot
    pub caltable: String,
    /// x axis, e.g. `time`
    pub xaxis: String,
    /// y axis, e.g. `amp` or `phase`
    pub yaxis: String,
    /// time range selection
    pub timerange: String,
    /// facet by, e.g. `antenna`
    pub iteration: String,
    /// antenna selection
    pub antenna: String,
    /// panel layout, e.g. `421`
    pub subplot: i64,
    /// `[xmin, xmax, ymin, ymax]`, zero for automatic
    pub plotrange: Vec<f64>,
}

/// Operations on the named flag versions of a visibility dataset (`flagmanager`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagVersionAction {
    /// Snapshot the current flags
    Save {
        /// name of the snapshot
        versionname: String,
        /// replace an existing snapshot of the same name rather than merging into it
        replace: bool,
    },
    /// Roll the current flags back to a snapshot
    Restore {
        /// name of the snapshot
        versionname: String,
    },
}

/// The external toolkit. Every method blocks until the task is done.
///
/// None of the methods validate their parameters: an empty mandatory field is the toolkit's
/// problem, and its error is returned unchanged.
pub trait Toolkit {
    /// Image (and optionally deconvolve) visibilities.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn tclean(&self, params: &TcleanParams) -> Result<(), ToolkitError>;

    /// Solve for antenna based gains against the current model, writing `params.caltable`.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn gaincal(&self, params: &GaincalParams) -> Result<(), ToolkitError>;

    /// Apply calibration tables to the corrected data column, in place.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn applycal(&self, params: &ApplycalParams) -> Result<(), ToolkitError>;

    /// Save or restore a named flag version of `vis`.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn flagmanager(&self, vis: &str, action: &FlagVersionAction) -> Result<(), ToolkitError>;

    /// Remove a table, if it exists.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn rmtables(&self, table: &str) -> Result<(), ToolkitError>;

    /// Reset the corrected data column of `vis`.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn clearcal(&self, vis: &str) -> Result<(), ToolkitError>;

    /// Delete the sky model stored in `vis`.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn delmod(&self, vis: &str, otf: bool) -> Result<(), ToolkitError>;

    /// Plot calibration solutions.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn plotcal(&self, params: &PlotcalParams) -> Result<(), ToolkitError>;

    /// Write `datacolumn` of `vis` into a new dataset `outputvis`.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn split(&self, vis: &str, outputvis: &str, datacolumn: &str) -> Result<(), ToolkitError>;

    /// Convert a FITS image into a toolkit image.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn importfits(&self, fitsimage: &str, imagename: &str) -> Result<(), ToolkitError>;

    /// Convert a toolkit image into a FITS image.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn exportfits(
        &self,
        imagename: &str,
        fitsimage: &str,
        overwrite: bool,
        history: bool,
    ) -> Result<(), ToolkitError>;

    /// The shape of an image, fastest axis first.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn image_shape(&self, image: &str) -> Result<Vec<usize>, ToolkitError>;

    /// A header value of an image which is a quantity, e.g. `cdelt2`.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn image_header_quantity(&self, image: &str, key: &str) -> Result<Quantity, ToolkitError>;

    /// The restoring beam of an image.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn restoring_beam(&self, image: &str) -> Result<Beam, ToolkitError>;

    /// Overwrite the restoring beam of an image.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn set_restoring_beam(&self, image: &str, beam: &Beam) -> Result<(), ToolkitError>;

    /// Convolve the first two axes of `image` with a Gaussian, writing `outfile`.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn convolve2d(&self, image: &str, outfile: &str, beam: &Beam) -> Result<(), ToolkitError>;

    /// Evaluate an image expression over `images` (referred to as `IM0`, `IM1`, ...).
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit
    fn immath(&self, images: &[String], expr: &str, outfile: &str) -> Result<(), ToolkitError>;

    /// The first plane of an image as `[y][x]`.
    ///
    /// # Errors
    ///
    /// Any failure reported by the toolkit, or reading the pixels back
    fn image_pixels(&self, image: &str) -> Result<Array2<f32>, ToolkitError>;

    /// The directory relative image and table names are resolved in, if not the current one.
    fn workdir(&self) -> Option<&Path> {
        None
    }
}
