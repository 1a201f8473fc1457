//! Structured task invocations.
//!
//! A [`TaskCall`] is a task name plus an ordered list of keyword arguments. It is only turned
//! into text at the very last moment, when it is rendered as a Python call for the toolkit's
//! interpreter, so there is no quoting to get wrong anywhere else.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::toolkit::{ApplycalParams, GaincalParams, PlotcalParams, TcleanParams};

/// A keyword argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskValue {
    /// `'text'`
    Str(String),
    /// `42`
    Int(i64),
    /// `4.25`
    Float(f64),
    /// `True` / `False`
    Bool(bool),
    /// `[a, b, ...]`
    List(Vec<TaskValue>),
    /// `None`
    None,
}

impl From<&str> for TaskValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<&String> for TaskValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<String> for TaskValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for TaskValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for TaskValue {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for TaskValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for TaskValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<TaskValue> + Clone> From<&[T]> for TaskValue {
    fn from(values: &[T]) -> Self {
        Self::List(values.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<TaskValue> + Clone> From<&Vec<T>> for TaskValue {
    fn from(values: &Vec<T>) -> Self {
        values.as_slice().into()
    }
}

impl Display for TaskValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => {
                write!(f, "'")?;
                for c in s.chars() {
                    match c {
                        '\\' => write!(f, "\\\\")?,
                        '\'' => write!(f, "\\'")?,
                        '\n' => write!(f, "\\n")?,
                        c if c.is_control() => write!(f, "\\x{:02x}", c as u32)?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "'")
            }
            Self::Int(i) => write!(f, "{i}"),
            // Debug formatting keeps the decimal point, so the toolkit sees a float.
            Self::Float(x) if x.is_finite() => write!(f, "{x:?}"),
            Self::Float(x) if x.is_nan() => write!(f, "float('nan')"),
            Self::Float(x) if *x > 0.0 => write!(f, "float('inf')"),
            Self::Float(_) => write!(f, "float('-inf')"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::List(values) => write!(f, "[{}]", values.iter().join(", ")),
            Self::None => write!(f, "None"),
        }
    }
}

/// A single invocation of a toolkit task, or a method of one of its tools.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCall {
    /// The callable, e.g. `gaincal` or `ia.convolve2d`
    pub name: String,
    /// keyword arguments, in the order they are rendered
    pub args: Vec<(&'static str, TaskValue)>,
}

impl TaskCall {
    /// A call with no arguments yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: vec![],
        }
    }

    /// Append a keyword argument
    #[must_use]
    pub fn arg(mut self, key: &'static str, value: impl Into<TaskValue>) -> Self {
        self.args.push((key, value.into()));
        self
    }

    /// Look up a keyword argument
    pub fn get(&self, key: &str) -> Option<&TaskValue> {
        self.args.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

impl Display for TaskCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({})",
            self.name,
            self.args
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .join(", ")
        )
    }
}

fn spwmap_value(spwmap: &[Vec<i64>]) -> TaskValue {
    TaskValue::List(spwmap.iter().map(Into::into).collect())
}

impl From<&TcleanParams> for TaskCall {
    fn from(p: &TcleanParams) -> Self {
        TaskCall::new("tclean")
            .arg("vis", &p.vis)
            .arg("imagename", &p.imagename)
            .arg("field", &p.field)
            .arg("spw", &p.spw)
            .arg("uvrange", &p.uvrange)
            .arg("datacolumn", &p.datacolumn)
            .arg("specmode", &p.specmode)
            .arg("stokes", &p.stokes)
            .arg("deconvolver", p.deconvolver.as_str())
            .arg("scales", &p.scales)
            .arg("nterms", p.nterms)
            .arg("imsize", &p.imsize[..])
            .arg("cell", &p.cell)
            .arg("weighting", &p.weighting)
            .arg("robust", p.robust)
            .arg("niter", p.niter)
            .arg("threshold", &p.threshold)
            .arg("nsigma", p.nsigma)
            .arg("interactive", p.interactive)
            .arg("gridder", &p.gridder)
            .arg("pbcor", p.pbcor)
            .arg("uvtaper", &p.uvtaper)
            .arg("savemodel", &p.savemodel)
            .arg("usemask", &p.usemask)
            .arg("mask", &p.mask)
            .arg("negativethreshold", p.negativethreshold)
            .arg("lownoisethreshold", p.lownoisethreshold)
            .arg("noisethreshold", p.noisethreshold)
            .arg("sidelobethreshold", p.sidelobethreshold)
            .arg("minbeamfrac", p.minbeamfrac)
            .arg("cycleniter", p.cycleniter)
            .arg("verbose", p.verbose)
    }
}

impl From<&GaincalParams> for TaskCall {
    fn from(p: &GaincalParams) -> Self {
        let mut call = TaskCall::new("gaincal")
            .arg("vis", &p.vis)
            .arg("caltable", &p.caltable)
            .arg("field", &p.field)
            .arg("spw", &p.spw)
            .arg("gaintype", &p.gaintype)
            .arg("refant", &p.refant)
            .arg("calmode", &p.calmode)
            .arg("combine", &p.combine)
            .arg("solint", &p.solint)
            .arg("minsnr", p.minsnr)
            .arg("minblperant", p.minblperant);
        if !p.gaintable.is_empty() {
            call = call
                .arg("gaintable", &p.gaintable)
                .arg("spwmap", spwmap_value(&p.spwmap));
        }
        call.arg("solnorm", p.solnorm)
    }
}

impl From<&ApplycalParams> for TaskCall {
    fn from(p: &ApplycalParams) -> Self {
        TaskCall::new("applycal")
            .arg("vis", &p.vis)
            .arg("field", &p.field)
            .arg("gaintable", &p.gaintable)
            .arg("gainfield", &p.gainfield)
            .arg("spwmap", spwmap_value(&p.spwmap))
            .arg("interp", &p.interp)
            .arg("calwt", p.calwt)
            .arg("flagbackup", p.flagbackup)
    }
}

impl From<&PlotcalParams> for TaskCall {
    fn from(p: &PlotcalParams) -> Self {
        TaskCall::new("plotcal")
            .arg("caltable", &p.caltable)
            .arg("xaxis", &p.xaxis)
            .arg("yaxis", &p.yaxis)
            .arg("timerange", &p.timerange)
            .arg("iteration", &p.iteration)
            .arg("subplot", p.subplot)
            .arg("antenna", &p.antenna)
            .arg("plotrange", &p.plotrange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::Deconvolver;

    #[test]
    fn test_render_scalars() {
        assert_eq!(TaskValue::from("obs.ms").to_string(), "'obs.ms'");
        assert_eq!(TaskValue::from(2.0).to_string(), "2.0");
        assert_eq!(TaskValue::from(0.3).to_string(), "0.3");
        assert_eq!(TaskValue::from(-1_i64).to_string(), "-1");
        assert_eq!(TaskValue::from(true).to_string(), "True");
        assert_eq!(TaskValue::from(false).to_string(), "False");
        assert_eq!(TaskValue::None.to_string(), "None");
        assert_eq!(TaskValue::Float(f64::NAN).to_string(), "float('nan')");
    }

    #[test]
    fn test_render_escapes_quotes() {
        assert_eq!(
            TaskValue::from("it's a \\ path").to_string(),
            r"'it\'s a \\ path'"
        );
    }

    #[test]
    fn test_render_escapes_control_characters() {
        assert_eq!(
            TaskValue::from("line\r\nnext\ttab\u{7f}").to_string(),
            r"'line\x0d\nnext\x09tab\x7f'"
        );
    }

    #[test]
    fn test_render_lists() {
        let imsize: &[usize] = &[512, 256];
        assert_eq!(TaskValue::from(imsize).to_string(), "[512, 256]");
        let empty: Vec<String> = vec![];
        assert_eq!(TaskValue::from(&empty).to_string(), "[]");
        assert_eq!(
            spwmap_value(&[vec![0, 0], vec![]]).to_string(),
            "[[0, 0], []]"
        );
    }

    #[test]
    fn test_render_call() {
        let call = TaskCall::new("rmtables").arg("tablenames", "pcal0");
        assert_eq!(call.to_string(), "rmtables(tablenames='pcal0')");
        assert_eq!(call.get("tablenames"), Some(&TaskValue::from("pcal0")));
        assert_eq!(call.get("missing"), None);
    }

    #[test]
    fn test_tclean_call_keeps_types() {
        let params = TcleanParams {
            vis: "obs.ms".into(),
            imagename: "img".into(),
            deconvolver: Deconvolver::Mtmfs,
            imsize: [512, 512],
            robust: 2.0,
            niter: 100,
            ..Default::default()
        };
        let call = TaskCall::from(&params);
        assert_eq!(call.name, "tclean");
        assert_eq!(call.get("deconvolver"), Some(&TaskValue::from("mtmfs")));
        let rendered = call.to_string();
        assert!(rendered.starts_with("tclean(vis='obs.ms', imagename='img', "));
        assert!(rendered.contains("imsize=[512, 512]"));
        assert!(rendered.contains("robust=2.0"));
        assert!(rendered.contains("niter=100"));
    }

    #[test]
    fn test_gaincal_call_only_chains_when_asked() {
        let mut params = GaincalParams {
            vis: "obs.ms".into(),
            caltable: "pcal0".into(),
            calmode: "p".into(),
            solint: "int".into(),
            ..Default::default()
        };
        let call = TaskCall::from(&params);
        assert_eq!(call.get("gaintable"), None);
        assert_eq!(call.get("spwmap"), None);

        params.gaintable = vec!["phase.cal".into()];
        params.spwmap = vec![vec![0, 0]];
        let rendered = TaskCall::from(&params).to_string();
        assert!(rendered.contains("gaintable=['phase.cal'], spwmap=[[0, 0]]"));
    }
}
