//! Imaging with the external GPU maximum entropy solver, `gpuvmem`.
//!
//! The solver only writes a model image and residual visibilities. The restored image is
//! assembled afterwards with the toolkit: the model is convolved with the restoring beam of a
//! dirty image of the residuals, and the two are summed.

use std::{
    fmt::{Display, Formatter},
    fs::File,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use derive_builder::Builder;
use itertools::Itertools;
use log::{debug, info, trace, warn};

use super::{image_statistics, Imager, ImagerConfig, ImagerError};
use crate::{
    stats::ReconstructionStatistics,
    toolkit::{Deconvolver, TcleanParams, Toolkit},
    util::remove_matching,
};

/// Image of the residual visibilities, also the source of the restoring beam
const RESIDUAL_IMAGE: &str = "residual";
/// The model image, imported from the solver's output
const MODEL_IMAGE: &str = "model_out";
/// The model image convolved with the restoring beam
const CONVOLVED_MODEL_IMAGE: &str = "convolved_model_out";

/// Solver settings of [`GpuVmem`], on top of the shared [`ImagerConfig`].
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(default, setter(into))]
pub struct GpuVmemParams {
    /// the solver executable
    pub executable: String,
    /// CUDA block dimensions `[x, y, v]`
    pub gpublocks: [usize; 3],
    /// initial values of the image parameters
    pub initialvalues: Vec<f64>,
    /// regularization factors
    pub regfactors: Vec<f64>,
    /// GPUs to run on
    pub gpuids: Vec<usize>,
    /// suffix of the residual visibilities the solver writes
    pub residualoutput: String,
    /// the solver's own configuration file
    pub inputdatfile: String,
    /// threads used when gridding
    pub griddingthreads: usize,
    /// constrain the image to be positive
    pub positivity: bool,
    /// grid the visibilities before solving
    pub gridding: bool,
    /// write intermediate images
    pub printimages: bool,
    /// where the solver runs and captures its output
    pub workdir: PathBuf,
    /// carry on restoring even if the solver exits unsuccessfully
    pub ignore_exit_status: bool,
}

impl Default for GpuVmemParams {
    fn default() -> Self {
        Self {
            executable: "gpuvmem".into(),
            gpublocks: [16, 16, 256],
            initialvalues: vec![],
            regfactors: vec![],
            gpuids: vec![0],
            residualoutput: "residuals.ms".into(),
            inputdatfile: "input.dat".into(),
            griddingthreads: 4,
            positivity: true,
            gridding: false,
            printimages: false,
            workdir: PathBuf::from("."),
            ignore_exit_status: false,
        }
    }
}

/// A single invocation of the solver: the program and its arguments, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuVmemCommand {
    /// the executable
    pub program: String,
    /// arguments, passed to the process unmodified
    pub args: Vec<String>,
}

impl GpuVmemCommand {
    /// The arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Display for GpuVmemCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut words = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str));
        match shlex::try_join(words.clone()) {
            Ok(line) => write!(f, "{line}"),
            // unquotable (nul bytes), show it raw
            Err(_) => write!(f, "{}", words.join(" ")),
        }
    }
}

/// `path`, or `path` under `base` if it is relative
fn resolve(base: &Path, path: &str) -> String {
    base.join(path).to_string_lossy().into_owned()
}

fn join_values<T: std::fmt::Debug>(values: &[T]) -> String {
    values.iter().map(|v| format!("{v:?}")).join(",")
}

/// Images with the external `gpuvmem` solver, then restores the model with the toolkit.
pub struct GpuVmem<'a> {
    config: ImagerConfig,
    params: GpuVmemParams,
    toolkit: &'a dyn Toolkit,
    statistics: Option<ReconstructionStatistics>,
}

impl<'a> GpuVmem<'a> {
    /// Create a new imager that restores through `toolkit`.
    pub fn new(config: ImagerConfig, params: GpuVmemParams, toolkit: &'a dyn Toolkit) -> Self {
        Self {
            config,
            params,
            toolkit,
            statistics: None,
        }
    }

    /// The solver settings
    pub fn params(&self) -> &GpuVmemParams {
        &self.params
    }

    /// The solver settings, for modification between runs
    pub fn params_mut(&mut self) -> &mut GpuVmemParams {
        &mut self.params
    }

    /// The solver invocation which reads `model_input` and writes `model_output` and
    /// `residual_output`.
    ///
    /// The solver runs in [`GpuVmemParams::workdir`], so every relative path it is given is
    /// resolved against `base`, the directory the toolkit reads and writes in.
    pub fn command(
        &self,
        base: &Path,
        model_input: &str,
        model_output: &str,
        residual_output: &str,
    ) -> GpuVmemCommand {
        let p = &self.params;
        let mut args: Vec<String> = vec![
            "-X".into(),
            p.gpublocks[0].to_string(),
            "-Y".into(),
            p.gpublocks[1].to_string(),
            "-V".into(),
            p.gpublocks[2].to_string(),
            "-i".into(),
            resolve(base, &self.config.inputvis),
            "-o".into(),
            resolve(base, residual_output),
            "-z".into(),
            join_values(&p.initialvalues),
            "-Z".into(),
            join_values(&p.regfactors),
            "-G".into(),
            join_values(&p.gpuids),
            "-m".into(),
            resolve(base, model_input),
            "-O".into(),
            resolve(base, model_output),
            "-I".into(),
            resolve(base, &p.inputdatfile),
            "-R".into(),
            format!("{:?}", self.config.robust),
            "-t".into(),
            self.config.niter.to_string(),
        ];
        if p.gridding {
            args.extend(["-g".into(), p.griddingthreads.to_string()]);
        }
        if p.printimages {
            args.push("--print-images".into());
        }
        if !p.positivity {
            args.push("--nopositivity".into());
        }
        if self.config.verbose {
            args.push("--verbose".into());
        }
        if self.config.savemodel {
            args.push("--savemodel-input".into());
        }
        GpuVmemCommand {
            program: p.executable.clone(),
            args,
        }
    }

    /// Make a dirty image to serve as the solver's starting model, returning its FITS name.
    fn make_canvas(&self, name: &str) -> Result<String, ImagerError> {
        let (m, n) = self.config.imsize;
        self.toolkit.tclean(&TcleanParams {
            vis: self.config.inputvis.clone(),
            imagename: name.to_string(),
            specmode: "mfs".into(),
            niter: 0,
            deconvolver: Deconvolver::Hogbom,
            interactive: false,
            cell: self.config.cell.clone(),
            stokes: self.config.stokes.clone(),
            robust: self.config.robust,
            imsize: [m, n],
            weighting: "briggs".into(),
            ..Default::default()
        })?;
        let fitsimage = format!("{name}.fits");
        self.toolkit
            .exportfits(&format!("{name}.image"), &fitsimage, true, true)?;
        Ok(fitsimage)
    }

    /// Run the solver to completion, its output streams captured in the working directory.
    fn launch(&self, command: &GpuVmemCommand) -> Result<(), ImagerError> {
        let workdir = &self.params.workdir;
        let stdout = create_capture(workdir, "stdout.txt")?;
        let stderr_path = workdir.join("stderr.txt");
        let stderr = create_capture(workdir, "stderr.txt")?;

        let status = Command::new(&command.program)
            .args(&command.args)
            .current_dir(workdir)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|source| ImagerError::Spawn {
                executable: command.program.clone(),
                source,
            })?;

        if !status.success() {
            if !self.params.ignore_exit_status {
                return Err(ImagerError::ExecutableFailed {
                    executable: command.program.clone(),
                    status: status.to_string(),
                    stderr_path,
                });
            }
            warn!(
                "{} finished with {}, restoring anyway",
                command.program, status
            );
        }
        Ok(())
    }

    /// Assemble the restored image from the solver's model and residual visibilities.
    /// Stale products of an earlier run are first removed from `base`, the toolkit's directory.
    /// Returns the FITS names of the residual and restored images.
    fn restore(
        &self,
        base: &Path,
        model_fits: &str,
        residual_ms: &str,
        restored_image: &str,
    ) -> Result<(String, String), ImagerError> {
        trace!("start restore {}", restored_image);
        let tk = self.toolkit;
        let restored_fits = format!("{restored_image}.fits");

        let stale: Vec<String> = [
            "*.log".to_string(),
            "*.last".to_string(),
            format!("{RESIDUAL_IMAGE}.*"),
            MODEL_IMAGE.to_string(),
            CONVOLVED_MODEL_IMAGE.to_string(),
            format!("{CONVOLVED_MODEL_IMAGE}.fits"),
            restored_image.to_string(),
            restored_fits.clone(),
        ]
        .into();
        let removed = remove_matching(base, &stale)?;
        debug!("removed {} stale artifacts", removed.len());

        tk.importfits(model_fits, MODEL_IMAGE)?;
        let shape = tk.image_shape(MODEL_IMAGE)?;
        let cdelt = tk
            .image_header_quantity(MODEL_IMAGE, "cdelt2")?
            .convert("arcsec")?;
        debug!("{MODEL_IMAGE}: shape {shape:?}, pixel size {cdelt}");

        let (m, n) = self.config.imsize;
        tk.tclean(&TcleanParams {
            vis: residual_ms.to_string(),
            imagename: RESIDUAL_IMAGE.to_string(),
            specmode: "mfs".into(),
            deconvolver: Deconvolver::Hogbom,
            niter: 0,
            stokes: self.config.stokes.clone(),
            weighting: "briggs".into(),
            nterms: 1,
            robust: self.config.robust,
            imsize: [m, n],
            cell: self.config.cell.clone(),
            datacolumn: "RESIDUAL".into(),
            ..Default::default()
        })?;
        let residual_image = format!("{RESIDUAL_IMAGE}.image");
        let residual_fits = format!("{residual_image}.fits");
        tk.exportfits(&residual_image, &residual_fits, true, false)?;

        let beam = tk.restoring_beam(&residual_image)?;
        debug!("restoring beam {beam}");

        let convolved_fits = format!("{CONVOLVED_MODEL_IMAGE}.fits");
        tk.convolve2d(MODEL_IMAGE, CONVOLVED_MODEL_IMAGE, &beam)?;
        tk.exportfits(CONVOLVED_MODEL_IMAGE, &convolved_fits, true, false)?;
        tk.set_restoring_beam(&convolved_fits, &beam)?;

        tk.immath(
            &[convolved_fits, residual_fits.clone()],
            "(IM0 + IM1)",
            restored_image,
        )?;
        tk.exportfits(restored_image, &restored_fits, true, false)?;

        trace!("end restore {}", restored_image);
        Ok((residual_fits, restored_fits))
    }
}

fn create_capture(workdir: &Path, name: &str) -> Result<File, ImagerError> {
    let path = workdir.join(name);
    File::create(&path).map_err(|source| ImagerError::OutputFile { path, source })
}

impl<'a> Imager for GpuVmem<'a> {
    fn config(&self) -> &ImagerConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut ImagerConfig {
        &mut self.config
    }

    fn run(&mut self, imagename: &str) -> Result<(), ImagerError> {
        trace!("start gpuvmem {}", imagename);
        let model_input = self.make_canvas(&format!("{imagename}_input"))?;
        let model_output = format!("{imagename}.fits");
        let residual_output = format!("{imagename}_{}", self.params.residualoutput);
        let restored_image = format!("{imagename}.restored");

        let cwd = std::env::current_dir().map_err(|source| ImagerError::CurrentDir { source })?;
        let base = match self.toolkit.workdir() {
            Some(workdir) => cwd.join(workdir),
            None => cwd,
        };
        let command = self.command(&base, &model_input, &model_output, &residual_output);
        info!("{}", command);
        self.launch(&command)?;

        let (residual_fits, restored_fits) =
            self.restore(&base, &model_output, &residual_output, &restored_image)?;

        let statistics = image_statistics(
            self.toolkit,
            &restored_fits,
            &residual_fits,
            self.config.stdv_pixels,
        )?;
        info!("{}: {}", imagename, statistics);
        self.statistics = Some(statistics);
        trace!("end gpuvmem {}", imagename);
        Ok(())
    }

    fn statistics(&self) -> Option<&ReconstructionStatistics> {
        self.statistics.as_ref()
    }
}
