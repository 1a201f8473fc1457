//! Imaging with the toolkit's own deconvolution task.

use derive_builder::Builder;
use log::{info, trace};

use super::{image_statistics, Imager, ImagerConfig, ImagerError};
use crate::{
    stats::ReconstructionStatistics,
    toolkit::{Deconvolver, TcleanParams, Toolkit},
};

/// Deconvolution settings of [`Clean`], on top of the shared [`ImagerConfig`].
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(default, setter(into))]
pub struct CleanParams {
    /// number of Taylor terms
    pub nterms: i64,
    /// stopping threshold
    pub threshold: String,
    /// stopping threshold in units of the noise
    pub nsigma: f64,
    /// interactive masking
    pub interactive: bool,
    /// user mask
    pub mask: String,
    /// masking mode
    pub usemask: String,
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
    /// spectral definition mode
    pub specmode: String,
    /// gridding convolution function
    pub gridder: String,
    /// minor cycle algorithm
    pub deconvolver: Deconvolver,
    /// uv taper
    pub uvtaper: Vec<String>,
    /// multi-scale scales (pixels)
    pub scales: Vec<i64>,
    /// uv-range selection
    pub uvrange: String,
    /// primary beam correction
    pub pbcor: bool,
    /// maximum minor cycle iterations per major cycle
    pub cycleniter: i64,
}

impl Default for CleanParams {
    fn default() -> Self {
        Self {
            nterms: 1,
            threshold: "0.0mJy".into(),
            nsigma: 0.0,
            interactive: false,
            mask: String::new(),
            usemask: "auto-multithresh".into(),
            negativethreshold: 0.0,
            lownoisethreshold: 1.5,
            noisethreshold: 4.25,
            sidelobethreshold: 2.0,
            minbeamfrac: 0.3,
            specmode: "mfs".into(),
            gridder: "standard".into(),
            deconvolver: Deconvolver::Hogbom,
            uvtaper: vec![],
            scales: vec![],
            uvrange: String::new(),
            pbcor: false,
            cycleniter: -1,
        }
    }
}

/// Images with `tclean`, deconvolving and saving the model in one step.
pub struct Clean<'a> {
    config: ImagerConfig,
    params: CleanParams,
    toolkit: &'a dyn Toolkit,
    statistics: Option<ReconstructionStatistics>,
}

impl<'a> Clean<'a> {
    /// Create a new imager that runs its tasks through `toolkit`.
    pub fn new(config: ImagerConfig, params: CleanParams, toolkit: &'a dyn Toolkit) -> Self {
        Self {
            config,
            params,
            toolkit,
            statistics: None,
        }
    }

    /// The deconvolution settings
    pub fn params(&self) -> &CleanParams {
        &self.params
    }

    /// The deconvolution settings, for modification between runs
    pub fn params_mut(&mut self) -> &mut CleanParams {
        &mut self.params
    }

    /// The restored and residual images `tclean` writes for `imagename`. Multi-term
    /// deconvolution writes one image per Taylor term; the zeroth term is used.
    pub fn output_images(&self, imagename: &str) -> (String, String) {
        if self.params.deconvolver.is_multi_term() {
            (
                format!("{imagename}.image.tt0"),
                format!("{imagename}.residual.tt0"),
            )
        } else {
            (format!("{imagename}.image"), format!("{imagename}.residual"))
        }
    }

    /// The full `tclean` parameters of a run producing `imagename`.
    pub fn tclean_params(&self, imagename: &str) -> TcleanParams {
        let (m, n) = self.config.imsize;
        TcleanParams {
            vis: self.config.inputvis.clone(),
            imagename: imagename.to_string(),
            field: self.config.field.clone(),
            spw: self.config.spw.clone(),
            uvrange: self.params.uvrange.clone(),
            datacolumn: self.config.datacolumn.clone(),
            specmode: self.params.specmode.clone(),
            stokes: self.config.stokes.clone(),
            deconvolver: self.params.deconvolver,
            scales: self.params.scales.clone(),
            nterms: self.params.nterms,
            imsize: [m, n],
            cell: self.config.cell.clone(),
            weighting: "briggs".into(),
            robust: self.config.robust,
            niter: self.config.niter,
            threshold: self.params.threshold.clone(),
            nsigma: self.params.nsigma,
            interactive: self.params.interactive,
            gridder: self.params.gridder.clone(),
            pbcor: self.params.pbcor,
            uvtaper: self.params.uvtaper.clone(),
            savemodel: if self.config.savemodel {
                "modelcolumn".into()
            } else {
                "none".into()
            },
            usemask: self.params.usemask.clone(),
            mask: self.params.mask.clone(),
            negativethreshold: self.params.negativethreshold,
            lownoisethreshold: self.params.lownoisethreshold,
            noisethreshold: self.params.noisethreshold,
            sidelobethreshold: self.params.sidelobethreshold,
            minbeamfrac: self.params.minbeamfrac,
            cycleniter: self.params.cycleniter,
            verbose: self.config.verbose,
        }
    }
}

impl<'a> Imager for Clean<'a> {
    fn config(&self) -> &ImagerConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut ImagerConfig {
        &mut self.config
    }

    fn run(&mut self, imagename: &str) -> Result<(), ImagerError> {
        trace!("start clean {}", imagename);
        self.toolkit.tclean(&self.tclean_params(imagename))?;

        let (restored, residual) = self.output_images(imagename);
        let statistics =
            image_statistics(self.toolkit, &restored, &residual, self.config.stdv_pixels)?;
        info!("{}: {}", imagename, statistics);
        self.statistics = Some(statistics);
        trace!("end clean {}", imagename);
        Ok(())
    }

    fn statistics(&self) -> Option<&ReconstructionStatistics> {
        self.statistics.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{casa::TaskValue, imager::ImagerConfigBuilder, test_common::RecordingToolkit};
    use approx::assert_abs_diff_eq;

    fn obs_config() -> ImagerConfig {
        ImagerConfigBuilder::default()
            .inputvis("obs.ms")
            .output("obs")
            .cell("0.05arcsec")
            .field("3C286")
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_params() {
        let params = CleanParamsBuilder::default().build().unwrap();
        assert_eq!(params, CleanParams::default());
        assert_eq!(params.usemask, "auto-multithresh");
        assert_eq!(params.noisethreshold, 4.25);
        assert_eq!(params.deconvolver, Deconvolver::Hogbom);
    }

    #[test]
    fn test_output_images_depend_on_deconvolver() {
        let toolkit = RecordingToolkit::default();
        let mut clean = Clean::new(obs_config(), CleanParams::default(), &toolkit);
        assert_eq!(
            clean.output_images("obs_ph0"),
            ("obs_ph0.image".to_string(), "obs_ph0.residual".to_string())
        );
        clean.params_mut().deconvolver = Deconvolver::Mtmfs;
        assert_eq!(
            clean.output_images("obs_ph0"),
            (
                "obs_ph0.image.tt0".to_string(),
                "obs_ph0.residual.tt0".to_string()
            )
        );
    }

    #[test]
    fn test_savemodel_selects_model_column() {
        let toolkit = RecordingToolkit::default();
        let mut clean = Clean::new(obs_config(), CleanParams::default(), &toolkit);
        let params = clean.tclean_params("img");
        assert_eq!(params.savemodel, "modelcolumn");
        assert_eq!(params.weighting, "briggs");
        assert_eq!(params.imsize, [512, 512]);
        assert_eq!(params.field, "3C286");

        clean.set_savemodel(false);
        assert_eq!(clean.tclean_params("img").savemodel, "none");
    }

    #[test]
    fn test_run_computes_statistics() {
        let toolkit = RecordingToolkit::default();
        let mut clean = Clean::new(obs_config(), CleanParams::default(), &toolkit);
        assert_eq!(clean.psnr(), None);

        clean.run("obs_ph0").unwrap();

        let names = toolkit.call_names();
        assert_eq!(names, vec!["tclean", "image_pixels", "image_pixels"]);
        let calls = toolkit.calls();
        assert_eq!(calls[0].get("imagename"), Some(&TaskValue::from("obs_ph0")));
        assert_eq!(
            calls[1].get("image"),
            Some(&TaskValue::from("obs_ph0.image"))
        );
        assert_eq!(
            calls[2].get("image"),
            Some(&TaskValue::from("obs_ph0.residual"))
        );

        let expected = toolkit.expected_statistics(80);
        assert_abs_diff_eq!(clean.psnr().unwrap(), expected.psnr, epsilon = 1e-9);
        assert_abs_diff_eq!(clean.peak().unwrap(), expected.peak, epsilon = 1e-9);
        assert_abs_diff_eq!(clean.stdv().unwrap(), expected.stdv, epsilon = 1e-9);
    }

    #[test]
    fn test_statistics_follow_the_images() {
        let toolkit = RecordingToolkit::default();
        let mut clean = Clean::new(obs_config(), CleanParams::default(), &toolkit);
        clean.run("obs_ph0").unwrap();
        let first = *clean.statistics().unwrap();

        toolkit.scale_signal(2.0);
        clean.run("obs_ph1").unwrap();
        let second = *clean.statistics().unwrap();

        assert_ne!(first, second);
        assert_abs_diff_eq!(second.peak, 2.0 * first.peak, epsilon = 1e-9);
        assert_abs_diff_eq!(second.psnr, 2.0 * first.psnr, epsilon = 1e-6);
        assert_abs_diff_eq!(second.stdv, first.stdv, epsilon = 1e-12);
        assert_eq!(second, toolkit.expected_statistics(80));
    }

    #[test]
    fn test_failed_run_keeps_previous_statistics() {
        let toolkit = RecordingToolkit::default();
        let mut clean = Clean::new(obs_config(), CleanParams::default(), &toolkit);
        clean.run("obs_ph0").unwrap();
        let before = *clean.statistics().unwrap();

        toolkit.fail_on("tclean");
        assert!(matches!(
            clean.run("obs_ph1"),
            Err(ImagerError::Toolkit(_))
        ));
        assert_eq!(clean.statistics(), Some(&before));
    }
}
