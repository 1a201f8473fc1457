//! Command Line Interface helpers for selfcal

use crate::{
    casa::CasaToolkit,
    error::{CLIError::InvalidCommandLineArgument, SelfcalError, SelfcalError::DryRun},
    imager::{
        Clean, CleanParams, GpuVmem, GpuVmemParams, Imager, ImagerConfig, WsClean,
    },
    selfcal::{CalMode, Selfcal, SelfcalConfig},
    toolkit::Deconvolver,
};
use clap::{arg, command, ArgMatches, ErrorKind::ArgumentNotFound, PossibleValue, ValueHint};
use itertools::Itertools;
use log::{debug, info, trace};
use prettytable::{format as prettyformat, row, table};
use std::{
    ffi::OsString,
    fmt::{Debug, Display},
    str::FromStr,
};

/// Which imager reconstructs the model between calibration rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagerKind {
    /// the toolkit's `tclean`
    Clean,
    /// the external `gpuvmem` solver
    GpuVmem,
    /// placeholder, does nothing
    WsClean,
}

impl FromStr for ImagerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clean" => Ok(Self::Clean),
            "gpuvmem" => Ok(Self::GpuVmem),
            "wsclean" => Ok(Self::WsClean),
            other => Err(format!("unknown imager {other}")),
        }
    }
}

impl Display for ImagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Clean => "clean",
            Self::GpuVmem => "gpuvmem",
            Self::WsClean => "wsclean",
        })
    }
}

/// Everything needed to run one self-calibration loop from the command line.
pub struct SelfcalContext {
    /// The toolkit the tasks run in
    pub casa: CasaToolkit,
    /// Which imager to use
    pub imager_kind: ImagerKind,
    /// Settings shared by every imager
    pub imager_config: ImagerConfig,
    /// Settings used when `imager_kind` is [`ImagerKind::Clean`]
    pub clean_params: CleanParams,
    /// Settings used when `imager_kind` is [`ImagerKind::GpuVmem`]
    pub gpuvmem_params: GpuVmemParams,
    /// What is solved for
    pub mode: CalMode,
    /// Loop settings
    pub selfcal_config: SelfcalConfig,
    /// write the calibrated visibilities out when done
    pub split: bool,
    /// replace an existing output of the split
    pub overwrite: bool,
}

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Write many info-level log lines of how this executable was compiled.
///
/// # Errors
///
/// propagates writeln! fails
pub fn fmt_build_info(f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (GIT_HEAD_REF, GIT_COMMIT_HASH) {
        (Some(hr), Some(hash)) => {
            let dirty = GIT_DIRTY.unwrap_or(false);
            writeln!(
                f,
                "Compiled on git commit hash: {}{}",
                hash,
                if dirty { " (dirty)" } else { "" }
            )?;
            writeln!(f, "            git head ref: {}", hr)?;
        }
        _ => writeln!(f, "Compiled on git commit hash: <no git info>")?,
    }
    writeln!(f, "            {}", BUILT_TIME_UTC)?;
    writeln!(f, "         with compiler {}", RUSTC_VERSION)?;
    writeln!(f)?;
    Ok(())
}

fn will(yes: bool) -> &'static str {
    if yes {
        "Will"
    } else {
        "Will not"
    }
}

impl Display for SelfcalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;

        fmt_build_info(f)?;

        let config = &self.imager_config;
        writeln!(f, "Visibilities:         {}", self.selfcal_config.visfile)?;
        writeln!(f, "Image output:         {}", config.output)?;
        match self.imager_kind {
            ImagerKind::Clean => writeln!(
                f,
                "Imager:               clean ({})",
                self.clean_params.deconvolver
            )?,
            ImagerKind::GpuVmem => writeln!(
                f,
                "Imager:               gpuvmem ({}, gpus {})",
                self.gpuvmem_params.executable,
                self.gpuvmem_params.gpuids.iter().join(",")
            )?,
            ImagerKind::WsClean => writeln!(f, "Imager:               wsclean (no imaging)")?,
        }
        writeln!(
            f,
            "Image:                {} x {} pixels of {}, robust {}, stokes {}, {} iterations",
            config.imsize.0, config.imsize.1, config.cell, config.robust, config.stokes, config.niter
        )?;
        writeln!(
            f,
            "Calibration:          {} (gaintype {}), refant {}",
            self.mode,
            self.selfcal_config.gaintype,
            if self.selfcal_config.refant.is_empty() {
                "<auto>"
            } else {
                self.selfcal_config.refant.as_str()
            }
        )?;
        if let Some(input) = &self.selfcal_config.input_caltable {
            writeln!(f, "Prior table:          {}", input)?;
        }
        writeln!(f, "CASA:                 {}", self.casa.executable)?;

        writeln!(
            f,
            "{} plot calibration solutions",
            will(self.selfcal_config.want_plot)
        )?;
        writeln!(
            f,
            "{} split calibrated visibilities into {}.selfcal{}",
            will(self.split),
            self.selfcal_config.visfile,
            if self.split && self.overwrite {
                ", overwriting"
            } else {
                ""
            }
        )?;

        let mut schedule_table = table!(["round", "solint", "table", "image", "flag version"]);
        schedule_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
        for (round, solint) in self.selfcal_config.solint.iter().enumerate() {
            schedule_table.add_row(row![
                format!("{}:", round),
                solint,
                self.mode.caltable(round),
                format!("{}{}", config.output, self.mode.image_suffix(round)),
                self.mode.flag_version(round)
            ]);
        }
        writeln!(
            f,
            "Schedule ({} rounds):\n{}",
            self.selfcal_config.solint.len(),
            schedule_table
        )?;
        Ok(())
    }
}

/// `value_of_t`, with an absent argument as `None`
fn optional_value_of_t<R>(matches: &ArgMatches, name: &str) -> Result<Option<R>, SelfcalError>
where
    R: FromStr,
    <R as FromStr>::Err: Display,
{
    match matches.value_of_t::<R>(name) {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.kind() == ArgumentNotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// `values_of_t`, with an absent argument as `None`
fn optional_values_of_t<R>(
    matches: &ArgMatches,
    name: &str,
) -> Result<Option<Vec<R>>, SelfcalError>
where
    R: FromStr,
    <R as FromStr>::Err: Display,
{
    match matches.values_of_t::<R>(name) {
        Ok(values) => Ok(Some(values)),
        Err(err) if err.kind() == ArgumentNotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl SelfcalContext {
    fn get_matches<I, T>(args: I) -> Result<ArgMatches, SelfcalError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        let mut app = command!()
            .arg_required_else_help(true)
            .next_line_help(false)
            .about("Self-calibrate radio interferometric visibilities, alternating image \
                    reconstruction with antenna gain solving.")
            .args(&[
                // imaging options
                arg!(--vis <PATH> "Visibilities (measurement set) to calibrate, in place")
                    .required(true)
                    .value_hint(ValueHint::DirPath)
                    .help_heading("IMAGING"),
                arg!(--output <PATH> "Stem of the image names, suffixed with the round")
                    .required(true)
                    .help_heading("IMAGING"),
                arg!(--cell <SIZE> "Cell size, e.g. 0.05arcsec")
                    .required(true)
                    .help_heading("IMAGING"),
                arg!(--robust <ROBUST> "Briggs robust parameter [default: 2.0]")
                    .allow_hyphen_values(true)
                    .required(false)
                    .help_heading("IMAGING"),
                arg!(--imsize "Image size in pixels [default: 512 512]")
                    .value_names(&["M", "N"])
                    .required(false)
                    .help_heading("IMAGING"),
                arg!(--niter <ITERATIONS> "Maximum number of iterations [default: 100]")
                    .required(false)
                    .help_heading("IMAGING"),
                arg!(--field <FIELD> "Field selection")
                    .required(false)
                    .help_heading("IMAGING"),
                arg!(--spw <SPW> "Spectral window selection")
                    .required(false)
                    .help_heading("IMAGING"),
                arg!(--stokes <STOKES> "Polarization products to image [default: I]")
                    .required(false)
                    .help_heading("IMAGING"),
                arg!(--datacolumn <COLUMN> "Visibility column to image [default: corrected]")
                    .required(false)
                    .help_heading("IMAGING"),
                arg!(--"stdv-pixels" <PIXELS> "Side of the residual box the noise is measured in [default: 80]")
                    .required(false)
                    .help_heading("IMAGING"),
                arg!(--imager <IMAGER> "The imager to use")
                    .required(false)
                    .possible_values([
                        PossibleValue::new("clean").help("tclean, in the toolkit"),
                        PossibleValue::new("gpuvmem").help("the external gpuvmem solver"),
                        PossibleValue::new("wsclean").help("not implemented, skips imaging"),
                    ])
                    .default_value("clean")
                    .help_heading("IMAGING"),
                arg!(--deconvolver <DECONVOLVER> "tclean minor cycle algorithm [default: hogbom]")
                    .required(false)
                    .help_heading("IMAGING"),
                arg!(--nterms <TERMS> "tclean Taylor terms [default: 1]")
                    .required(false)
                    .help_heading("IMAGING"),

                // calibration options
                arg!(--mode <MODE> "What to solve for")
                    .required(false)
                    .possible_values([
                        PossibleValue::new("p").help("phase"),
                        PossibleValue::new("a").help("amplitude"),
                        PossibleValue::new("ap").help("amplitude and phase"),
                    ])
                    .default_value("p")
                    .help_heading("CALIBRATION"),
                arg!(--solint <SOLINT>... "Solution intervals, one round each")
                    .multiple_values(true)
                    .required(true)
                    .help_heading("CALIBRATION"),
                arg!(--refant <ANTENNA> "Reference antenna")
                    .required(false)
                    .help_heading("CALIBRATION"),
                arg!(--spwmap <SPWS>... "Spectral window map")
                    .multiple_values(true)
                    .required(false)
                    .help_heading("CALIBRATION"),
                arg!(--minblperant <COUNT> "Minimum baselines per antenna [default: 4]")
                    .required(false)
                    .help_heading("CALIBRATION"),
                arg!(--minsnr <SNR> "Minimum SNR of a solution [default: 3.0]")
                    .required(false)
                    .help_heading("CALIBRATION"),
                arg!(--combine <AXES> "Axes to combine across when solving")
                    .required(false)
                    .help_heading("CALIBRATION"),
                arg!(--gaintype <TYPE> "Gain type [default: T]")
                    .required(false)
                    .help_heading("CALIBRATION"),
                arg!(--interp <INTERP> "Interpolation when applying [default: linear]")
                    .required(false)
                    .help_heading("CALIBRATION"),
                arg!(--"input-caltable" <TABLE> "Prior table to chain into amplitude rounds")
                    .required(false)
                    .value_hint(ValueHint::DirPath)
                    .help_heading("CALIBRATION"),
                arg!(--"no-plot" "Do not plot calibration solutions")
                    .help_heading("CALIBRATION"),

                // gpuvmem options
                arg!(--gpuvmem <PATH> "gpuvmem executable [default: gpuvmem]")
                    .required(false)
                    .value_hint(ValueHint::ExecutablePath)
                    .help_heading("GPUVMEM"),
                arg!(--"gpu-ids" <IDS>... "GPUs to run on [default: 0]")
                    .multiple_values(true)
                    .required(false)
                    .help_heading("GPUVMEM"),
                arg!(--"reg-factors" <FACTORS>... "Regularization factors")
                    .multiple_values(true)
                    .required(false)
                    .help_heading("GPUVMEM"),
                arg!(--"initial-values" <VALUES>... "Initial values of the image parameters")
                    .multiple_values(true)
                    .required(false)
                    .help_heading("GPUVMEM"),
                arg!(--"gpu-blocks" "CUDA block dimensions [default: 16 16 256]")
                    .value_names(&["X", "Y", "V"])
                    .required(false)
                    .help_heading("GPUVMEM"),
                arg!(--"gridding-threads" <THREADS> "Grid the visibilities before solving, on this many threads")
                    .required(false)
                    .help_heading("GPUVMEM"),
                arg!(--"input-dat" <PATH> "The solver's configuration file [default: input.dat]")
                    .required(false)
                    .value_hint(ValueHint::FilePath)
                    .help_heading("GPUVMEM"),
                arg!(--"residual-output" <SUFFIX> "Suffix of the residual visibilities [default: residuals.ms]")
                    .required(false)
                    .help_heading("GPUVMEM"),
                arg!(--"gpuvmem-workdir" <PATH> "Where the solver runs and its output is captured [default: .]")
                    .required(false)
                    .value_hint(ValueHint::DirPath)
                    .help_heading("GPUVMEM"),
                arg!(--"no-positivity" "Do not constrain the image to be positive")
                    .help_heading("GPUVMEM"),
                arg!(--"print-images" "Write the solver's intermediate images")
                    .help_heading("GPUVMEM"),
                arg!(--"ignore-exit-status" "Restore the model even if the solver fails")
                    .help_heading("GPUVMEM"),

                // output options
                arg!(--casa <PATH> "CASA executable [default: casa]")
                    .required(false)
                    .value_hint(ValueHint::ExecutablePath)
                    .help_heading("OUTPUT"),
                arg!(--split "Write the calibrated visibilities to <VIS>.selfcal when done")
                    .help_heading("OUTPUT"),
                arg!(--overwrite "Replace an existing <VIS>.selfcal")
                    .requires("split")
                    .help_heading("OUTPUT"),
                arg!(--"dry-run" "Just print the summary and exit"),
            ]);
        let matches = app.try_get_matches_from_mut(args)?;
        Ok(matches)
    }

    fn parse_imager_matches(matches: &ArgMatches) -> Result<ImagerConfig, SelfcalError> {
        let mut config = ImagerConfig::default();
        if let Some(vis) = matches.value_of("vis") {
            config.inputvis = vis.into();
        }
        if let Some(output) = matches.value_of("output") {
            config.output = output.into();
        }
        if let Some(cell) = matches.value_of("cell") {
            config.cell = cell.into();
        }
        if let Some(robust) = optional_value_of_t::<f64>(matches, "robust")? {
            if !(-2.0..=2.0).contains(&robust) {
                return Err(SelfcalError::CLIError(InvalidCommandLineArgument {
                    option: "--robust <ROBUST>".into(),
                    expected: "a number from -2 to 2".into(),
                    received: format!("{}", robust),
                }));
            }
            config.robust = robust;
        }
        if let Some(imsize) = optional_values_of_t::<usize>(matches, "imsize")? {
            match imsize[..] {
                [m, n] if m > 0 && n > 0 => config.imsize = (m, n),
                _ => {
                    return Err(SelfcalError::CLIError(InvalidCommandLineArgument {
                        option: "--imsize <M> <N>".into(),
                        expected: "two positive, non-zero integers".into(),
                        received: imsize.iter().join(" "),
                    }))
                }
            }
        }
        if let Some(niter) = optional_value_of_t::<i64>(matches, "niter")? {
            config.niter = niter;
        }
        if let Some(field) = matches.value_of("field") {
            config.field = field.into();
        }
        if let Some(spw) = matches.value_of("spw") {
            config.spw = spw.into();
        }
        if let Some(stokes) = matches.value_of("stokes") {
            config.stokes = stokes.into();
        }
        if let Some(datacolumn) = matches.value_of("datacolumn") {
            config.datacolumn = datacolumn.into();
        }
        if let Some(stdv_pixels) = optional_value_of_t::<usize>(matches, "stdv-pixels")? {
            if stdv_pixels == 0 {
                return Err(SelfcalError::CLIError(InvalidCommandLineArgument {
                    option: "--stdv-pixels <PIXELS>".into(),
                    expected: "a positive, non-zero integer".into(),
                    received: format!("{}", stdv_pixels),
                }));
            }
            config.stdv_pixels = stdv_pixels;
        }
        Ok(config)
    }

    fn parse_clean_matches(matches: &ArgMatches) -> Result<CleanParams, SelfcalError> {
        let mut params = CleanParams::default();
        if let Some(deconvolver) = matches.value_of("deconvolver") {
            params.deconvolver = deconvolver.parse::<Deconvolver>().map_err(|_| {
                SelfcalError::CLIError(InvalidCommandLineArgument {
                    option: "--deconvolver <DECONVOLVER>".into(),
                    expected: "one of hogbom, clark, clarkstokes, multiscale, mtmfs, mem".into(),
                    received: deconvolver.into(),
                })
            })?;
        }
        if let Some(nterms) = optional_value_of_t::<i64>(matches, "nterms")? {
            if nterms < 1 {
                return Err(SelfcalError::CLIError(InvalidCommandLineArgument {
                    option: "--nterms <TERMS>".into(),
                    expected: "a positive, non-zero integer".into(),
                    received: format!("{}", nterms),
                }));
            }
            params.nterms = nterms;
        }
        Ok(params)
    }

    fn parse_gpuvmem_matches(matches: &ArgMatches) -> Result<GpuVmemParams, SelfcalError> {
        let mut params = GpuVmemParams::default();
        if let Some(executable) = matches.value_of("gpuvmem") {
            params.executable = executable.into();
        }
        if let Some(gpuids) = optional_values_of_t::<usize>(matches, "gpu-ids")? {
            params.gpuids = gpuids;
        }
        if let Some(regfactors) = optional_values_of_t::<f64>(matches, "reg-factors")? {
            params.regfactors = regfactors;
        }
        if let Some(initialvalues) = optional_values_of_t::<f64>(matches, "initial-values")? {
            params.initialvalues = initialvalues;
        }
        if let Some(gpublocks) = optional_values_of_t::<usize>(matches, "gpu-blocks")? {
            match gpublocks[..] {
                [x, y, v] if x > 0 && y > 0 && v > 0 => params.gpublocks = [x, y, v],
                _ => {
                    return Err(SelfcalError::CLIError(InvalidCommandLineArgument {
                        option: "--gpu-blocks <X> <Y> <V>".into(),
                        expected: "three positive, non-zero integers".into(),
                        received: gpublocks.iter().join(" "),
                    }))
                }
            }
        }
        if let Some(threads) = optional_value_of_t::<usize>(matches, "gridding-threads")? {
            if threads == 0 {
                return Err(SelfcalError::CLIError(InvalidCommandLineArgument {
                    option: "--gridding-threads <THREADS>".into(),
                    expected: "a positive, non-zero integer".into(),
                    received: format!("{}", threads),
                }));
            }
            params.gridding = true;
            params.griddingthreads = threads;
        }
        if let Some(inputdatfile) = matches.value_of("input-dat") {
            params.inputdatfile = inputdatfile.into();
        }
        if let Some(residualoutput) = matches.value_of("residual-output") {
            params.residualoutput = residualoutput.into();
        }
        if let Some(workdir) = matches.value_of("gpuvmem-workdir") {
            params.workdir = workdir.into();
        }
        params.positivity = !matches.is_present("no-positivity");
        params.printimages = matches.is_present("print-images");
        params.ignore_exit_status = matches.is_present("ignore-exit-status");
        Ok(params)
    }

    fn parse_selfcal_matches(matches: &ArgMatches) -> Result<SelfcalConfig, SelfcalError> {
        let mut config = SelfcalConfig {
            want_plot: !matches.is_present("no-plot"),
            ..SelfcalConfig::default()
        };
        if let Some(vis) = matches.value_of("vis") {
            config.visfile = vis.into();
        }
        if let Some(solint) = optional_values_of_t::<String>(matches, "solint")? {
            config.solint = solint;
        }
        if let Some(refant) = matches.value_of("refant") {
            config.refant = refant.into();
        }
        if let Some(spwmap) = optional_values_of_t::<i64>(matches, "spwmap")? {
            config.spwmap = spwmap;
        }
        if let Some(minblperant) = optional_value_of_t::<i64>(matches, "minblperant")? {
            if minblperant < 1 {
                return Err(SelfcalError::CLIError(InvalidCommandLineArgument {
                    option: "--minblperant <COUNT>".into(),
                    expected: "a positive, non-zero integer".into(),
                    received: format!("{}", minblperant),
                }));
            }
            config.minblperant = minblperant;
        }
        if let Some(minsnr) = optional_value_of_t::<f64>(matches, "minsnr")? {
            if minsnr.is_nan() || minsnr < 0.0 {
                return Err(SelfcalError::CLIError(InvalidCommandLineArgument {
                    option: "--minsnr <SNR>".into(),
                    expected: "a non-negative number".into(),
                    received: format!("{}", minsnr),
                }));
            }
            config.minsnr = minsnr;
        }
        if let Some(combine) = matches.value_of("combine") {
            config.combine = combine.into();
        }
        if let Some(gaintype) = matches.value_of("gaintype") {
            config.gaintype = gaintype.into();
        }
        if let Some(interp) = matches.value_of("interp") {
            config.interp = interp.into();
        }
        config.input_caltable = matches.value_of("input-caltable").map(Into::into);
        Ok(config)
    }

    /// Parse an iterator of arguments, `args` into a `SelfcalContext`.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - `clap::Error` if clap cannot parse `args`
    /// - `SelfcalError::CLIError` if the arguments are invalid.
    /// - `SelfcalError::DryRun` if only a summary was asked for.
    pub fn from_args<I, T>(args: I) -> Result<Self, SelfcalError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);

        let matches = Self::get_matches(args)?;
        trace!("arg matches:\n{:?}", &matches);

        let imager_kind = match matches.value_of("imager") {
            Some(kind) => kind
                .parse::<ImagerKind>()
                .map_err(|expected| {
                    SelfcalError::CLIError(InvalidCommandLineArgument {
                        option: "--imager <IMAGER>".into(),
                        expected,
                        received: kind.into(),
                    })
                })?,
            None => ImagerKind::Clean,
        };
        let mode = match matches.value_of("mode") {
            Some(mode) => mode.parse::<CalMode>().map_err(|expected| {
                SelfcalError::CLIError(InvalidCommandLineArgument {
                    option: "--mode <MODE>".into(),
                    expected,
                    received: mode.into(),
                })
            })?,
            None => CalMode::Phase,
        };

        let casa = match matches.value_of("casa") {
            Some(executable) => CasaToolkit::new(executable),
            None => CasaToolkit::default(),
        };

        let result = Self {
            casa,
            imager_kind,
            imager_config: Self::parse_imager_matches(&matches)?,
            clean_params: Self::parse_clean_matches(&matches)?,
            gpuvmem_params: Self::parse_gpuvmem_matches(&matches)?,
            mode,
            selfcal_config: Self::parse_selfcal_matches(&matches)?,
            split: matches.is_present("split"),
            overwrite: matches.is_present("overwrite"),
        };

        info!("{}", &result);

        if matches.is_present("dry-run") {
            return Err(DryRun {});
        }

        Ok(result)
    }

    /// Run the self-calibration loop, then split out the calibrated visibilities if asked to.
    /// Returns the tables of the completed rounds.
    ///
    /// # Errors
    ///
    /// can raise:
    /// - `SelfcalError::SelfcalLoopError` if a round fails
    pub fn run(self) -> Result<Vec<String>, SelfcalError> {
        let SelfcalContext {
            casa,
            imager_kind,
            imager_config,
            clean_params,
            gpuvmem_params,
            mode,
            selfcal_config,
            split,
            overwrite,
        } = self;

        let mut imager: Box<dyn Imager + '_> = match imager_kind {
            ImagerKind::Clean => Box::new(Clean::new(imager_config, clean_params, &casa)),
            ImagerKind::GpuVmem => Box::new(GpuVmem::new(imager_config, gpuvmem_params, &casa)),
            ImagerKind::WsClean => Box::new(WsClean::new(imager_config)),
        };

        let mut selfcal = Selfcal::new(mode, selfcal_config, imager.as_mut(), &casa);
        selfcal.run()?;
        let caltables = selfcal.caltables().to_vec();

        let mut results_table = table!(["table", "psnr", "peak", "stdv"]);
        results_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
        let last = caltables.len().saturating_sub(1);
        for (round, caltable) in caltables.iter().enumerate() {
            // the imager only keeps the statistics of its last image
            let imager = selfcal.imager();
            let stat = |value: Option<f64>| match value {
                Some(value) if round == last => format!("{:.4e}", value),
                _ => "-".to_string(),
            };
            results_table.add_row(row![
                caltable,
                stat(imager.psnr()),
                stat(imager.peak()),
                stat(imager.stdv())
            ]);
        }
        info!("{} self-calibration done:\n{}", mode, results_table);

        if split {
            let outputvis = selfcal.selfcal_output(overwrite)?;
            info!("calibrated visibilities written to {}", outputvis);
        }
        Ok(caltables)
    }
}
