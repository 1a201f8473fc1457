//! The self-calibration loop.
//!
//! Every round alternates imaging with gain solving: the image provides the model the gains are
//! solved against, and the solved gains are applied to the corrected column that the next image
//! is made from. One [`Selfcal`] runs a schedule of rounds, one per solution interval, in a
//! single [`CalMode`].
//!
//! In phase mode the image comes first in each round, since the model is needed before the first
//! solve. The amplitude modes expect a model to be present already (typically from a preceding
//! phase loop) and image at the end of each round instead.
//!
//! # Examples
//!
//! ```rust,no_run
//! use selfcal::{
//!     casa::CasaToolkit,
//!     imager::{Clean, CleanParams, ImagerConfigBuilder},
//!     selfcal::{Selfcal, SelfcalConfigBuilder},
//! };
//!
//! let casa = CasaToolkit::default();
//! let config = ImagerConfigBuilder::default()
//!     .inputvis("obs.ms")
//!     .output("obs")
//!     .cell("0.05arcsec")
//!     .build()
//!     .unwrap();
//! let mut clean = Clean::new(config, CleanParams::default(), &casa);
//!
//! let selfcal_config = SelfcalConfigBuilder::default()
//!     .visfile("obs.ms")
//!     .refant("DA42")
//!     .solint(vec!["inf".to_string(), "60s".to_string()])
//!     .build()
//!     .unwrap();
//! let mut phasecal = Selfcal::phasecal(selfcal_config, &mut clean, &casa);
//! let last_table = phasecal.run().unwrap();
//! println!("last table: {:?}", last_table);
//! ```

pub mod error;

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use derive_builder::Builder;
use log::{debug, info, trace};

use crate::{
    imager::Imager,
    toolkit::{ApplycalParams, FlagVersionAction, GaincalParams, PlotcalParams, Toolkit},
    util::remove_path,
};

pub use error::SelfcalLoopError;

/// The flag version saved before the first phase round
pub const BEFORE_PHASECAL: &str = "before_phasecal";

/// Settings of a self-calibration loop.
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(default, setter(into))]
pub struct SelfcalConfig {
    /// The visibilities being calibrated, in place
    pub visfile: String,
    /// reference antenna
    pub refant: String,
    /// spectral window map
    pub spwmap: Vec<i64>,
    /// minimum number of baselines per antenna
    pub minblperant: i64,
    /// plot each table after it is solved
    pub want_plot: bool,
    /// interpolation used when applying
    pub interp: String,
    /// gain type
    pub gaintype: String,
    /// solution intervals, one round each
    pub solint: Vec<String>,
    /// axes to combine across when solving
    pub combine: String,
    /// minimum SNR of an acceptable solution
    pub minsnr: f64,
    /// A prior table, pre-applied when solving and applied alongside each amplitude table.
    /// Unused in phase mode.
    #[builder(setter(into, strip_option))]
    pub input_caltable: Option<String>,
}

impl Default for SelfcalConfig {
    fn default() -> Self {
        Self {
            visfile: String::new(),
            refant: String::new(),
            spwmap: vec![],
            minblperant: 4,
            want_plot: true,
            interp: "linear".into(),
            gaintype: "T".into(),
            solint: vec![],
            combine: String::new(),
            minsnr: 3.0,
            input_caltable: None,
        }
    }
}

/// What is solved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalMode {
    /// phase only
    Phase,
    /// amplitude only
    Amplitude,
    /// amplitude and phase
    AmplitudePhase,
}

impl CalMode {
    /// The `calmode` the toolkit expects
    pub fn calmode(&self) -> &'static str {
        match self {
            Self::Phase => "p",
            Self::Amplitude => "a",
            Self::AmplitudePhase => "ap",
        }
    }

    /// The table solved in round `round`
    pub fn caltable(&self, round: usize) -> String {
        match self {
            Self::Phase => format!("pcal{round}"),
            Self::Amplitude => format!("ampcal_{round}"),
            Self::AmplitudePhase => format!("apcal_{round}"),
        }
    }

    /// Suffix on the imager's output path of the image made in round `round`
    pub fn image_suffix(&self, round: usize) -> String {
        match self {
            Self::Phase => format!("_ph{round}"),
            Self::Amplitude => format!("_a{round}"),
            Self::AmplitudePhase => format!("_ap{round}"),
        }
    }

    /// The flag version saved at the end of round `round`
    pub fn flag_version(&self, round: usize) -> String {
        match self {
            Self::Phase => format!("after_pcal{round}"),
            Self::Amplitude => format!("after_ampcal{round}"),
            Self::AmplitudePhase => format!("after_apcal{round}"),
        }
    }

    /// How a table of this mode is plotted
    pub fn plot_params(&self, caltable: &str) -> PlotcalParams {
        let (yaxis, plotrange) = match self {
            Self::Phase => ("phase", vec![0.0, 0.0, -180.0, 180.0]),
            Self::Amplitude | Self::AmplitudePhase => ("amp", vec![0.0, 0.0, 0.2, 1.8]),
        };
        PlotcalParams {
            caltable: caltable.to_string(),
            xaxis: "time".into(),
            yaxis: yaxis.into(),
            iteration: "antenna".into(),
            subplot: 421,
            plotrange,
            ..Default::default()
        }
    }

    /// Whether the image is made before the solve in each round
    fn images_first(&self) -> bool {
        matches!(self, Self::Phase)
    }
}

impl Display for CalMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Phase => "phase",
            Self::Amplitude => "amplitude",
            Self::AmplitudePhase => "amplitude and phase",
        })
    }
}

impl FromStr for CalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p" => Ok(Self::Phase),
            "a" => Ok(Self::Amplitude),
            "ap" => Ok(Self::AmplitudePhase),
            other => Err(format!("unknown calibration mode {other}")),
        }
    }
}

/// Where a loop is in its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfcalState {
    /// ready to run
    Idle,
    /// in the middle of round `round`
    Running {
        /// zero based round
        round: usize,
    },
    /// every round completed
    Done,
    /// a step of round `round` failed
    Failed {
        /// zero based round
        round: usize,
    },
}

impl Display for SelfcalState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running { round } => write!(f, "running round {round}"),
            Self::Done => write!(f, "done"),
            Self::Failed { round } => write!(f, "failed in round {round}"),
        }
    }
}

/// A self-calibration loop over the rounds of [`SelfcalConfig::solint`].
pub struct Selfcal<'a> {
    config: SelfcalConfig,
    mode: CalMode,
    imager: &'a mut dyn Imager,
    toolkit: &'a dyn Toolkit,
    imagename: String,
    caltables: Vec<String>,
    state: SelfcalState,
}

impl<'a> Selfcal<'a> {
    /// Create a loop in `mode`. Images are named after the imager's current output path.
    pub fn new(
        mode: CalMode,
        config: SelfcalConfig,
        imager: &'a mut dyn Imager,
        toolkit: &'a dyn Toolkit,
    ) -> Self {
        let imagename = imager.output_path().to_string();
        debug!(
            "{} self-calibration of {}, {} rounds",
            mode,
            config.visfile,
            config.solint.len()
        );
        Self {
            config,
            mode,
            imager,
            toolkit,
            imagename,
            caltables: vec![],
            state: SelfcalState::Idle,
        }
    }

    /// A phase only loop
    pub fn phasecal(
        config: SelfcalConfig,
        imager: &'a mut dyn Imager,
        toolkit: &'a dyn Toolkit,
    ) -> Self {
        Self::new(CalMode::Phase, config, imager, toolkit)
    }

    /// An amplitude only loop
    pub fn ampcal(
        config: SelfcalConfig,
        imager: &'a mut dyn Imager,
        toolkit: &'a dyn Toolkit,
    ) -> Self {
        Self::new(CalMode::Amplitude, config, imager, toolkit)
    }

    /// An amplitude and phase loop
    pub fn apcal(
        config: SelfcalConfig,
        imager: &'a mut dyn Imager,
        toolkit: &'a dyn Toolkit,
    ) -> Self {
        Self::new(CalMode::AmplitudePhase, config, imager, toolkit)
    }

    /// Run every round of the schedule, returning the last table solved, or `None` if the
    /// schedule is empty.
    ///
    /// # Errors
    ///
    /// - [`SelfcalLoopError::NotIdle`] unless the loop is [`SelfcalState::Idle`]
    /// - the first failure of the toolkit or the imager, after which the loop is
    ///   [`SelfcalState::Failed`] and the failed round's table is not in [`Selfcal::caltables`]
    pub fn run(&mut self) -> Result<Option<String>, SelfcalLoopError> {
        if self.state != SelfcalState::Idle {
            return Err(SelfcalLoopError::NotIdle { state: self.state });
        }
        trace!("start {} selfcal", self.mode);

        if self.mode == CalMode::Phase {
            self.state = SelfcalState::Running { round: 0 };
            let before = FlagVersionAction::Save {
                versionname: BEFORE_PHASECAL.into(),
                replace: true,
            };
            if let Err(e) = self.toolkit.flagmanager(&self.config.visfile, &before) {
                self.state = SelfcalState::Failed { round: 0 };
                return Err(e.into());
            }
        }

        for round in 0..self.config.solint.len() {
            self.state = SelfcalState::Running { round };
            if let Err(e) = self.run_round(round) {
                self.state = SelfcalState::Failed { round };
                return Err(e);
            }
        }

        self.state = SelfcalState::Done;
        trace!("end {} selfcal", self.mode);
        Ok(self.caltables.last().cloned())
    }

    fn run_round(&mut self, round: usize) -> Result<(), SelfcalLoopError> {
        let caltable = self.mode.caltable(round);
        info!(
            "{} round {}: solving {} over {}",
            self.mode, round, caltable, self.config.solint[round]
        );
        if self.mode.images_first() {
            self.image(round)?;
            self.solve(round, &caltable)?;
        } else {
            self.solve(round, &caltable)?;
            self.image(round)?;
        }
        self.caltables.push(caltable);
        Ok(())
    }

    fn image(&mut self, round: usize) -> Result<(), SelfcalLoopError> {
        let imagename = format!("{}{}", self.imagename, self.mode.image_suffix(round));
        self.imager.run(&imagename)?;
        if let Some(statistics) = self.imager.statistics() {
            info!("{}: {}", imagename, statistics);
        }
        Ok(())
    }

    fn solve(&self, round: usize, caltable: &str) -> Result<(), SelfcalLoopError> {
        let tk = self.toolkit;
        tk.rmtables(caltable)?;
        tk.gaincal(&self.gaincal_params(round, caltable))?;
        self.plot_selfcal(&self.mode.plot_params(caltable))?;
        tk.applycal(&self.applycal_params(caltable))?;
        tk.flagmanager(
            &self.config.visfile,
            &FlagVersionAction::Save {
                versionname: self.mode.flag_version(round),
                replace: false,
            },
        )?;
        Ok(())
    }

    /// The spectral window map, repeated once per table; empty if no map is set.
    fn spwmap_per_table(&self, tables: usize) -> Vec<Vec<i64>> {
        if self.config.spwmap.is_empty() {
            vec![]
        } else {
            vec![self.config.spwmap.clone(); tables]
        }
    }

    /// Tables pre-applied to the solve of each amplitude round
    fn prior_tables(&self) -> Vec<String> {
        match (&self.mode, &self.config.input_caltable) {
            (CalMode::Phase, _) | (_, None) => vec![],
            (_, Some(input)) => vec![input.clone()],
        }
    }

    fn gaincal_params(&self, round: usize, caltable: &str) -> GaincalParams {
        let gaintable = self.prior_tables();
        GaincalParams {
            vis: self.config.visfile.clone(),
            caltable: caltable.to_string(),
            field: self.imager.field().to_string(),
            spw: self.imager.spw().to_string(),
            gaintype: self.config.gaintype.clone(),
            refant: self.config.refant.clone(),
            calmode: self.mode.calmode().into(),
            combine: self.config.combine.clone(),
            solint: self.config.solint[round].clone(),
            minsnr: self.config.minsnr,
            minblperant: self.config.minblperant,
            spwmap: self.spwmap_per_table(gaintable.len()),
            gaintable,
            solnorm: self.mode != CalMode::Phase,
        }
    }

    fn applycal_params(&self, caltable: &str) -> ApplycalParams {
        let mut gaintable = self.prior_tables();
        gaintable.push(caltable.to_string());
        ApplycalParams {
            vis: self.config.visfile.clone(),
            field: self.imager.field().to_string(),
            spwmap: self.spwmap_per_table(gaintable.len()),
            gaintable,
            gainfield: String::new(),
            interp: self.config.interp.clone(),
            calwt: false,
            flagbackup: false,
        }
    }

    /// Plot a table, if plots are wanted at all.
    ///
    /// # Errors
    ///
    /// Any failure of the toolkit's plotting task
    pub fn plot_selfcal(&self, params: &PlotcalParams) -> Result<(), SelfcalLoopError> {
        if self.config.want_plot {
            self.toolkit.plotcal(params)?;
        }
        Ok(())
    }

    /// Undo the calibration: restore the flags to `versionname`, reset the corrected column,
    /// and delete the model. Afterwards the loop is idle with no tables, ready to run again.
    ///
    /// # Errors
    ///
    /// Any failure of the toolkit, in which case the loop is left as it was
    pub fn reset_selfcal(&mut self, versionname: &str) -> Result<(), SelfcalLoopError> {
        let vis = &self.config.visfile;
        self.toolkit.flagmanager(
            vis,
            &FlagVersionAction::Restore {
                versionname: versionname.to_string(),
            },
        )?;
        self.toolkit.clearcal(vis)?;
        self.toolkit.delmod(vis, true)?;
        self.caltables.clear();
        self.state = SelfcalState::Idle;
        info!("reset {} to {}", vis, versionname);
        Ok(())
    }

    /// Write the calibrated visibilities to `<visfile>.selfcal`, returning its path.
    ///
    /// # Errors
    ///
    /// Any failure of the toolkit, or removing an existing output when `overwrite` is set
    pub fn selfcal_output(&self, overwrite: bool) -> Result<String, SelfcalLoopError> {
        let outputvis = format!("{}.selfcal", self.config.visfile);
        if overwrite {
            remove_path(&outputvis)?;
        }
        self.toolkit
            .split(&self.config.visfile, &outputvis, "corrected")?;
        Ok(outputvis)
    }

    /// The calibration settings
    pub fn config(&self) -> &SelfcalConfig {
        &self.config
    }

    /// The visibilities being calibrated
    pub fn visfile(&self) -> &str {
        &self.config.visfile
    }

    /// The imager making the model
    pub fn imager(&self) -> &dyn Imager {
        &*self.imager
    }

    /// reference antenna
    pub fn refant(&self) -> &str {
        &self.config.refant
    }

    /// spectral window map
    pub fn spwmap(&self) -> &[i64] {
        &self.config.spwmap
    }

    /// Tables of the completed rounds, in order
    pub fn caltables(&self) -> &[String] {
        &self.caltables
    }

    /// Where the loop is in its schedule
    pub fn state(&self) -> SelfcalState {
        self.state
    }

    /// What the loop solves for
    pub fn mode(&self) -> CalMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        casa::{TaskCall, TaskValue},
        test_common::{RecordingImager, RecordingToolkit},
    };

    fn config(solint: &[&str]) -> SelfcalConfig {
        SelfcalConfigBuilder::default()
            .visfile("obs.ms")
            .refant("DA42")
            .solint(solint.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .build()
            .unwrap()
    }

    fn named<'c>(calls: &'c [TaskCall], name: &str) -> Vec<&'c TaskCall> {
        calls.iter().filter(|c| c.name == name).collect()
    }

    fn str_list(values: &[&str]) -> TaskValue {
        TaskValue::List(values.iter().map(|&v| v.into()).collect())
    }

    #[test]
    fn test_default_config() {
        let config = SelfcalConfigBuilder::default().build().unwrap();
        assert_eq!(config, SelfcalConfig::default());
        assert_eq!(config.minblperant, 4);
        assert_eq!(config.gaintype, "T");
        assert_eq!(config.interp, "linear");
        assert_eq!(config.minsnr, 3.0);
        assert!(config.want_plot);
        assert_eq!(config.input_caltable, None);
    }

    #[test]
    fn test_mode_naming() {
        assert_eq!(CalMode::Phase.caltable(1), "pcal1");
        assert_eq!(CalMode::Amplitude.caltable(1), "ampcal_1");
        assert_eq!(CalMode::AmplitudePhase.caltable(1), "apcal_1");
        assert_eq!(CalMode::Phase.image_suffix(2), "_ph2");
        assert_eq!(CalMode::Amplitude.image_suffix(2), "_a2");
        assert_eq!(CalMode::AmplitudePhase.image_suffix(2), "_ap2");
        assert_eq!(CalMode::Phase.flag_version(0), "after_pcal0");
        assert_eq!(CalMode::Amplitude.flag_version(0), "after_ampcal0");
        assert_eq!(CalMode::AmplitudePhase.flag_version(0), "after_apcal0");
        assert_eq!("ap".parse::<CalMode>(), Ok(CalMode::AmplitudePhase));
        assert!("x".parse::<CalMode>().is_err());

        let phase_plot = CalMode::Phase.plot_params("pcal0");
        assert_eq!(phase_plot.yaxis, "phase");
        assert_eq!(phase_plot.plotrange, vec![0.0, 0.0, -180.0, 180.0]);
        let amp_plot = CalMode::AmplitudePhase.plot_params("apcal_0");
        assert_eq!(amp_plot.yaxis, "amp");
        assert_eq!(amp_plot.plotrange, vec![0.0, 0.0, 0.2, 1.8]);
        assert_eq!(amp_plot.subplot, 421);
    }

    #[test]
    fn test_phasecal_order() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        imager.set_field("3C286");
        let mut phasecal = Selfcal::phasecal(config(&["inf", "60s"]), &mut imager, &toolkit);

        let last = phasecal.run().unwrap();
        assert_eq!(last.as_deref(), Some("pcal1"));
        assert_eq!(phasecal.caltables(), &["pcal0", "pcal1"]);
        assert_eq!(phasecal.state(), SelfcalState::Done);

        assert_eq!(
            toolkit.call_names(),
            vec![
                "flagmanager",
                "imager.run",
                "rmtables",
                "gaincal",
                "plotcal",
                "applycal",
                "flagmanager",
                "imager.run",
                "rmtables",
                "gaincal",
                "plotcal",
                "applycal",
                "flagmanager",
            ]
        );

        let calls = toolkit.calls();
        assert_eq!(
            calls[0].get("versionname"),
            Some(&TaskValue::from("before_phasecal"))
        );
        assert_eq!(calls[0].get("merge"), Some(&TaskValue::from("replace")));

        let runs = named(&calls, "imager.run");
        assert_eq!(runs[0].get("imagename"), Some(&TaskValue::from("obs_ph0")));
        assert_eq!(runs[1].get("imagename"), Some(&TaskValue::from("obs_ph1")));

        let gaincals = named(&calls, "gaincal");
        assert_eq!(gaincals[0].get("calmode"), Some(&TaskValue::from("p")));
        assert_eq!(gaincals[0].get("solint"), Some(&TaskValue::from("inf")));
        assert_eq!(gaincals[1].get("solint"), Some(&TaskValue::from("60s")));
        assert_eq!(gaincals[0].get("field"), Some(&TaskValue::from("3C286")));
        assert_eq!(gaincals[0].get("gaintable"), None);
        assert_eq!(gaincals[0].get("solnorm"), Some(&TaskValue::from(false)));

        let applycals = named(&calls, "applycal");
        assert_eq!(applycals[1].get("gaintable"), Some(&str_list(&["pcal1"])));
        assert_eq!(applycals[1].get("calwt"), Some(&TaskValue::from(false)));

        assert_eq!(
            toolkit.flag_versions(),
            vec!["after_pcal0", "after_pcal1", "before_phasecal"]
        );
    }

    #[test]
    fn test_ampcal_chains_input_table() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        let mut selfcal_config = config(&["inf"]);
        selfcal_config.input_caltable = Some("pcal1".into());
        selfcal_config.spwmap = vec![0, 0, 0, 0];
        let mut ampcal = Selfcal::ampcal(selfcal_config, &mut imager, &toolkit);

        assert_eq!(ampcal.run().unwrap().as_deref(), Some("ampcal_0"));
        assert_eq!(
            toolkit.call_names(),
            vec![
                "rmtables",
                "gaincal",
                "plotcal",
                "applycal",
                "flagmanager",
                "imager.run"
            ]
        );

        let calls = toolkit.calls();
        let gaincal = named(&calls, "gaincal")[0];
        assert_eq!(gaincal.get("calmode"), Some(&TaskValue::from("a")));
        assert_eq!(gaincal.get("gaintable"), Some(&str_list(&["pcal1"])));
        assert_eq!(gaincal.get("solnorm"), Some(&TaskValue::from(true)));
        let spwmap = TaskValue::from(&vec![0_i64, 0, 0, 0]);
        assert_eq!(
            gaincal.get("spwmap"),
            Some(&TaskValue::List(vec![spwmap.clone()]))
        );

        let applycal = named(&calls, "applycal")[0];
        assert_eq!(
            applycal.get("gaintable"),
            Some(&str_list(&["pcal1", "ampcal_0"]))
        );
        assert_eq!(
            applycal.get("spwmap"),
            Some(&TaskValue::List(vec![spwmap.clone(), spwmap]))
        );
        assert_eq!(
            named(&calls, "imager.run")[0].get("imagename"),
            Some(&TaskValue::from("obs_a0"))
        );
        assert_eq!(toolkit.flag_versions(), vec!["after_ampcal0"]);
    }

    #[test]
    fn test_apcal_without_input_table() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        let mut apcal = Selfcal::apcal(config(&["inf", "int"]), &mut imager, &toolkit);

        assert_eq!(apcal.run().unwrap().as_deref(), Some("apcal_1"));
        let calls = toolkit.calls();
        let gaincal = named(&calls, "gaincal")[1];
        assert_eq!(gaincal.get("calmode"), Some(&TaskValue::from("ap")));
        assert_eq!(gaincal.get("gaintable"), None);
        assert_eq!(
            named(&calls, "applycal")[1].get("gaintable"),
            Some(&str_list(&["apcal_1"]))
        );
        assert_eq!(
            named(&calls, "imager.run")[1].get("imagename"),
            Some(&TaskValue::from("obs_ap1"))
        );
    }

    #[test]
    fn test_no_plots_unless_wanted() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        let mut selfcal_config = config(&["inf"]);
        selfcal_config.want_plot = false;
        let mut phasecal = Selfcal::phasecal(selfcal_config, &mut imager, &toolkit);
        phasecal.run().unwrap();
        assert!(!toolkit.call_names().contains(&"plotcal".to_string()));
    }

    #[test]
    fn test_empty_schedule() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        let mut ampcal = Selfcal::ampcal(config(&[]), &mut imager, &toolkit);
        assert_eq!(ampcal.run().unwrap(), None);
        assert_eq!(ampcal.state(), SelfcalState::Done);
        assert!(toolkit.calls().is_empty());
    }

    #[test]
    fn test_rerun_requires_reset() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        let mut phasecal = Selfcal::phasecal(config(&["inf"]), &mut imager, &toolkit);
        phasecal.run().unwrap();

        assert!(matches!(
            phasecal.run(),
            Err(SelfcalLoopError::NotIdle {
                state: SelfcalState::Done
            })
        ));
        assert_eq!(phasecal.caltables(), &["pcal0"]);

        phasecal.reset_selfcal(BEFORE_PHASECAL).unwrap();
        assert_eq!(phasecal.state(), SelfcalState::Idle);
        assert!(phasecal.caltables().is_empty());
        assert_eq!(phasecal.run().unwrap().as_deref(), Some("pcal0"));
        assert_eq!(phasecal.caltables(), &["pcal0"]);
    }

    #[test]
    fn test_reset_restores_flags() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        let mut phasecal = Selfcal::phasecal(config(&["inf", "60s"]), &mut imager, &toolkit);
        let pristine = toolkit.flag_state();
        phasecal.run().unwrap();
        assert_ne!(toolkit.flag_state(), pristine);

        phasecal.reset_selfcal(BEFORE_PHASECAL).unwrap();
        assert_eq!(toolkit.flag_state(), pristine);

        // resetting twice ends in the same state
        phasecal.reset_selfcal(BEFORE_PHASECAL).unwrap();
        assert_eq!(toolkit.flag_state(), pristine);
        assert_eq!(phasecal.state(), SelfcalState::Idle);

        let calls = toolkit.calls();
        let tail: Vec<&str> = calls[calls.len() - 3..]
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(tail, vec!["flagmanager", "clearcal", "delmod"]);
        assert_eq!(
            calls.last().and_then(|c| c.get("otf")),
            Some(&TaskValue::from(true))
        );
    }

    #[test]
    fn test_reset_to_unknown_version_fails() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        let mut phasecal = Selfcal::phasecal(config(&["inf"]), &mut imager, &toolkit);
        phasecal.run().unwrap();

        assert!(matches!(
            phasecal.reset_selfcal("never_saved"),
            Err(SelfcalLoopError::Toolkit(_))
        ));
        assert_eq!(phasecal.state(), SelfcalState::Done);
        assert_eq!(phasecal.caltables(), &["pcal0"]);
    }

    #[test]
    fn test_failed_solve_marks_round() {
        let toolkit = RecordingToolkit::default();
        toolkit.fail_on_nth("gaincal", 1);
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        let mut phasecal =
            Selfcal::phasecal(config(&["inf", "60s", "int"]), &mut imager, &toolkit);

        assert!(matches!(phasecal.run(), Err(SelfcalLoopError::Toolkit(_))));
        assert_eq!(phasecal.state(), SelfcalState::Failed { round: 1 });
        assert_eq!(phasecal.caltables(), &["pcal0"]);
        // nothing after the failed solve
        assert_eq!(toolkit.call_names().last().map(String::as_str), Some("gaincal"));
    }

    #[test]
    fn test_failed_image_marks_round() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        imager.fail_on("obs_ap0");
        let mut apcal = Selfcal::apcal(config(&["inf"]), &mut imager, &toolkit);

        assert!(matches!(apcal.run(), Err(SelfcalLoopError::Imager(_))));
        assert_eq!(apcal.state(), SelfcalState::Failed { round: 0 });
        assert!(apcal.caltables().is_empty());
    }

    #[test]
    fn test_selfcal_output() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let visfile = tmp_dir.path().join("obs.ms");
        let existing = tmp_dir.path().join("obs.ms.selfcal");
        std::fs::create_dir_all(existing.join("table.f0")).unwrap();

        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("obs", toolkit.log());
        let mut selfcal_config = config(&[]);
        selfcal_config.visfile = visfile.to_string_lossy().to_string();
        let phasecal = Selfcal::phasecal(selfcal_config, &mut imager, &toolkit);

        let outputvis = phasecal.selfcal_output(false).unwrap();
        assert_eq!(outputvis, existing.to_string_lossy());
        assert!(existing.exists());

        phasecal.selfcal_output(true).unwrap();
        assert!(!existing.exists());

        let calls = toolkit.calls();
        let splits = named(&calls, "split");
        assert_eq!(splits.len(), 2);
        assert_eq!(
            splits[0].get("outputvis"),
            Some(&TaskValue::from(outputvis.as_str()))
        );
        assert_eq!(
            splits[0].get("datacolumn"),
            Some(&TaskValue::from("corrected"))
        );
    }

    #[test]
    fn test_accessors() {
        let toolkit = RecordingToolkit::default();
        let mut imager = RecordingImager::with_log("out/obs", toolkit.log());
        let mut selfcal_config = config(&["inf"]);
        selfcal_config.spwmap = vec![0, 0];
        let ampcal = Selfcal::ampcal(selfcal_config, &mut imager, &toolkit);
        assert_eq!(ampcal.visfile(), "obs.ms");
        assert_eq!(ampcal.refant(), "DA42");
        assert_eq!(ampcal.spwmap(), &[0, 0]);
        assert_eq!(ampcal.mode(), CalMode::Amplitude);
        assert_eq!(ampcal.state(), SelfcalState::Idle);
        assert_eq!(ampcal.imager().output_path(), "out/obs");
    }
}
