//! Recording fakes of the toolkit and of an imager, shared by the unit tests.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    casa::TaskCall,
    imager::{Imager, ImagerConfig, ImagerConfigBuilder, ImagerError},
    ndarray::Array2,
    stats::ReconstructionStatistics,
    toolkit::{
        ApplycalParams, Beam, FlagVersionAction, GaincalParams, PlotcalParams, Quantity,
        TcleanParams, Toolkit, ToolkitError,
    },
};

/// Every call made to the fakes, in order. Shared so that the toolkit and imager interleave.
pub type CallLog = Rc<RefCell<Vec<TaskCall>>>;

/// The flags of the fake dataset, modelled as the tables applied to it so far.
#[derive(Debug, Default)]
struct FlagModel {
    current: Vec<String>,
    versions: BTreeMap<String, Vec<String>>,
}

/// A toolkit that records every call instead of running it.
///
/// Queries return fixed values. Pixels come from a point source signal image or, for any image
/// with `residual` in its name, a low level residual pattern.
pub struct RecordingToolkit {
    log: CallLog,
    failures: RefCell<Vec<(String, usize)>>,
    flags: RefCell<FlagModel>,
    signal: RefCell<Array2<f32>>,
    residual: RefCell<Array2<f32>>,
    pub beam: Beam,
    /// where names are resolved, as reported by [`Toolkit::workdir`]
    pub workdir: Option<PathBuf>,
}

impl Default for RecordingToolkit {
    fn default() -> Self {
        let mut signal = Array2::<f32>::zeros((128, 128));
        signal[[64, 64]] = 2.5;
        signal[[20, 90]] = 0.75;
        let residual =
            Array2::from_shape_fn((128, 128), |(y, x)| ((x * 7 + y * 13) % 11) as f32 * 0.01 - 0.05);
        Self {
            log: Rc::new(RefCell::new(vec![])),
            failures: RefCell::new(vec![]),
            flags: RefCell::new(FlagModel::default()),
            signal: RefCell::new(signal),
            residual: RefCell::new(residual),
            beam: Beam {
                major: Quantity::new(0.05, "arcsec"),
                minor: Quantity::new(0.04, "arcsec"),
                pa: Quantity::new(-30.0, "deg"),
            },
            workdir: None,
        }
    }
}

impl RecordingToolkit {
    /// The shared log, to hand to a [`RecordingImager`]
    pub fn log(&self) -> CallLog {
        Rc::clone(&self.log)
    }

    pub fn calls(&self) -> Vec<TaskCall> {
        self.log.borrow().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.log.borrow().iter().map(|c| c.name.clone()).collect()
    }

    /// Fail every call of `task` from now on
    pub fn fail_on(&self, task: &str) {
        self.fail_on_nth(task, 0);
    }

    /// Let `n` calls of `task` through, then fail every one after
    pub fn fail_on_nth(&self, task: &str, n: usize) {
        self.failures.borrow_mut().push((task.to_string(), n));
    }

    /// The tables applied since the dataset was pristine
    pub fn flag_state(&self) -> Vec<String> {
        self.flags.borrow().current.clone()
    }

    /// Names of the saved flag versions, sorted
    pub fn flag_versions(&self) -> Vec<String> {
        self.flags.borrow().versions.keys().cloned().collect()
    }

    /// Scale the pixels every later signal image read returns
    pub fn scale_signal(&self, factor: f32) {
        self.signal.borrow_mut().mapv_inplace(|v| v * factor);
    }

    /// The statistics a run over the default pixels should derive
    pub fn expected_statistics(&self, stdv_pixels: usize) -> ReconstructionStatistics {
        ReconstructionStatistics::from_images(
            self.signal.borrow().view(),
            self.residual.borrow().view(),
            stdv_pixels,
        )
        .unwrap()
    }

    fn record(&self, call: TaskCall) -> Result<(), ToolkitError> {
        let task = call.name.clone();
        self.log.borrow_mut().push(call);
        let mut failures = self.failures.borrow_mut();
        if let Some((_, remaining)) = failures.iter_mut().find(|(name, _)| *name == task) {
            if *remaining == 0 {
                return Err(ToolkitError::TaskFailed {
                    task,
                    status: "exit status: 1".into(),
                    stderr: "injected failure".into(),
                });
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

impl Toolkit for RecordingToolkit {
    fn tclean(&self, params: &TcleanParams) -> Result<(), ToolkitError> {
        self.record(params.into())
    }

    fn gaincal(&self, params: &GaincalParams) -> Result<(), ToolkitError> {
        self.record(params.into())
    }

    fn applycal(&self, params: &ApplycalParams) -> Result<(), ToolkitError> {
        self.record(params.into())?;
        self.flags
            .borrow_mut()
            .current
            .extend(params.gaintable.iter().cloned());
        Ok(())
    }

    fn flagmanager(&self, vis: &str, action: &FlagVersionAction) -> Result<(), ToolkitError> {
        let call = TaskCall::new("flagmanager").arg("vis", vis);
        match action {
            FlagVersionAction::Save {
                versionname,
                replace,
            } => {
                let mut call = call.arg("mode", "save").arg("versionname", versionname);
                if *replace {
                    call = call.arg("merge", "replace");
                }
                self.record(call)?;
                let mut flags = self.flags.borrow_mut();
                let snapshot = flags.current.clone();
                flags.versions.insert(versionname.clone(), snapshot);
                Ok(())
            }
            FlagVersionAction::Restore { versionname } => {
                self.record(
                    call.arg("mode", "restore")
                        .arg("versionname", versionname),
                )?;
                let mut flags = self.flags.borrow_mut();
                let snapshot = flags.versions.get(versionname).cloned().ok_or_else(|| {
                    ToolkitError::TaskFailed {
                        task: "flagmanager".into(),
                        status: "exit status: 1".into(),
                        stderr: format!("no flag version {versionname}"),
                    }
                })?;
                flags.current = snapshot;
                Ok(())
            }
        }
    }

    fn rmtables(&self, table: &str) -> Result<(), ToolkitError> {
        self.record(TaskCall::new("rmtables").arg("tablenames", table))
    }

    fn clearcal(&self, vis: &str) -> Result<(), ToolkitError> {
        self.record(TaskCall::new("clearcal").arg("vis", vis))
    }

    fn delmod(&self, vis: &str, otf: bool) -> Result<(), ToolkitError> {
        self.record(TaskCall::new("delmod").arg("vis", vis).arg("otf", otf))
    }

    fn plotcal(&self, params: &PlotcalParams) -> Result<(), ToolkitError> {
        self.record(params.into())
    }

    fn split(&self, vis: &str, outputvis: &str, datacolumn: &str) -> Result<(), ToolkitError> {
        self.record(
            TaskCall::new("split")
                .arg("vis", vis)
                .arg("outputvis", outputvis)
                .arg("datacolumn", datacolumn),
        )
    }

    fn importfits(&self, fitsimage: &str, imagename: &str) -> Result<(), ToolkitError> {
        self.record(
            TaskCall::new("importfits")
                .arg("fitsimage", fitsimage)
                .arg("imagename", imagename),
        )
    }

    fn exportfits(
        &self,
        imagename: &str,
        fitsimage: &str,
        overwrite: bool,
        history: bool,
    ) -> Result<(), ToolkitError> {
        self.record(
            TaskCall::new("exportfits")
                .arg("imagename", imagename)
                .arg("fitsimage", fitsimage)
                .arg("overwrite", overwrite)
                .arg("history", history),
        )
    }

    fn image_shape(&self, image: &str) -> Result<Vec<usize>, ToolkitError> {
        self.record(TaskCall::new("image_shape").arg("image", image))?;
        Ok(vec![512, 512, 1, 1])
    }

    fn image_header_quantity(&self, image: &str, key: &str) -> Result<Quantity, ToolkitError> {
        self.record(
            TaskCall::new("image_header_quantity")
                .arg("image", image)
                .arg("key", key),
        )?;
        Ok(Quantity::new(1.0e-6, "deg"))
    }

    fn restoring_beam(&self, image: &str) -> Result<Beam, ToolkitError> {
        self.record(TaskCall::new("restoring_beam").arg("image", image))?;
        Ok(self.beam.clone())
    }

    fn set_restoring_beam(&self, image: &str, beam: &Beam) -> Result<(), ToolkitError> {
        self.record(
            TaskCall::new("set_restoring_beam")
                .arg("image", image)
                .arg("beam", beam.to_string()),
        )
    }

    fn convolve2d(&self, image: &str, outfile: &str, beam: &Beam) -> Result<(), ToolkitError> {
        self.record(
            TaskCall::new("convolve2d")
                .arg("image", image)
                .arg("outfile", outfile)
                .arg("beam", beam.to_string()),
        )
    }

    fn immath(&self, images: &[String], expr: &str, outfile: &str) -> Result<(), ToolkitError> {
        self.record(
            TaskCall::new("immath")
                .arg("imagename", images)
                .arg("expr", expr)
                .arg("outfile", outfile),
        )
    }

    fn image_pixels(&self, image: &str) -> Result<Array2<f32>, ToolkitError> {
        self.record(TaskCall::new("image_pixels").arg("image", image))?;
        if image.contains("residual") {
            Ok(self.residual.borrow().clone())
        } else {
            Ok(self.signal.borrow().clone())
        }
    }

    fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }
}

/// An imager that records its runs in a shared log and reports made up statistics.
pub struct RecordingImager {
    config: ImagerConfig,
    log: CallLog,
    fail_on: Option<String>,
    statistics: Option<ReconstructionStatistics>,
}

impl RecordingImager {
    /// An imager whose images are named after `output`
    pub fn with_log(output: &str, log: CallLog) -> Self {
        Self {
            config: ImagerConfigBuilder::default()
                .inputvis("obs.ms")
                .output(output)
                .build()
                .unwrap(),
            log,
            fail_on: None,
            statistics: None,
        }
    }

    /// Fail the run producing `imagename`
    pub fn fail_on(&mut self, imagename: &str) {
        self.fail_on = Some(imagename.to_string());
    }
}

impl Imager for RecordingImager {
    fn config(&self) -> &ImagerConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut ImagerConfig {
        &mut self.config
    }

    fn run(&mut self, imagename: &str) -> Result<(), ImagerError> {
        self.log.borrow_mut().push(
            TaskCall::new("imager.run")
                .arg("imagename", imagename)
                .arg("vis", &self.config.inputvis),
        );
        if self.fail_on.as_deref() == Some(imagename) {
            return Err(ImagerError::Toolkit(ToolkitError::TaskFailed {
                task: "tclean".into(),
                status: "exit status: 1".into(),
                stderr: "injected failure".into(),
            }));
        }
        let round = self.log.borrow().len() as f64;
        self.statistics = Some(ReconstructionStatistics {
            psnr: 10.0 * round,
            peak: round,
            stdv: 0.1,
        });
        Ok(())
    }

    fn statistics(&self) -> Option<&ReconstructionStatistics> {
        self.statistics.as_ref()
    }
}
