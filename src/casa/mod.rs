//! Drive CASA as the external toolkit.
//!
//! Each [`Toolkit`] method becomes a short Python script that is handed to a fresh `casa`
//! process with `-c`. Tasks run in that process's working directory. Query methods print a
//! single marker line (`__SELFCAL__ ...`) which is parsed back out of stdout.

pub mod task;

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;

use crate::{
    fits::read_fits_plane,
    ndarray::Array2,
    toolkit::{
        ApplycalParams, Beam, FlagVersionAction, GaincalParams, PlotcalParams, Quantity,
        TcleanParams, Toolkit, ToolkitError,
    },
};

pub use task::{TaskCall, TaskValue};

/// The line prefix query scripts use to report their result.
pub const RESULT_MARKER: &str = "__SELFCAL__";

lazy_static! {
    static ref RESULT_RE: Regex = Regex::new(&format!(r"(?m)^{RESULT_MARKER} (.*)$")).unwrap();
}

/// A [`Toolkit`] backed by CASA subprocesses.
#[derive(Debug, Clone)]
pub struct CasaToolkit {
    /// the casa executable
    pub executable: String,
    /// flags passed before `-c`
    pub flags: Vec<String>,
    /// working directory of the casa processes, or the current directory if `None`
    pub workdir: Option<PathBuf>,
}

impl Default for CasaToolkit {
    fn default() -> Self {
        Self {
            executable: "casa".into(),
            flags: vec!["--nologger".into(), "--nogui".into(), "--agg".into()],
            workdir: None,
        }
    }
}

/// Wrap statements so that any exception raised by a task exits non-zero.
fn script(statements: &[String]) -> String {
    let mut script = String::from("import sys\ntry:\n");
    for statement in statements {
        script.push_str("    ");
        script.push_str(statement);
        script.push('\n');
    }
    script.push_str("except Exception as e:\n");
    script.push_str("    sys.stderr.write(str(e) + '\\n')\n");
    script.push_str("    sys.exit(1)\n");
    script
}

/// A statement printing `values` after the result marker.
fn report<S: AsRef<str>>(values: &[S]) -> String {
    let values: Vec<&str> = values.iter().map(AsRef::as_ref).collect();
    format!("print('{RESULT_MARKER}', {})", values.join(", "))
}

/// The tokens of the last result line in `stdout`.
fn result_tokens<'a>(task: &str, stdout: &'a str) -> Result<Vec<&'a str>, ToolkitError> {
    RESULT_RE
        .captures_iter(stdout)
        .last()
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().split_whitespace().collect())
        .ok_or_else(|| ToolkitError::MissingResult {
            task: task.to_string(),
        })
}

fn bad_result(task: &str, tokens: &[&str]) -> ToolkitError {
    ToolkitError::BadResult {
        task: task.to_string(),
        received: tokens.join(" "),
    }
}

fn parse_shape(task: &str, tokens: &[&str]) -> Result<Vec<usize>, ToolkitError> {
    tokens
        .iter()
        .map(|t| t.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| bad_result(task, tokens))
}

/// Parse `value unit` pairs.
fn parse_quantities(task: &str, tokens: &[&str]) -> Result<Vec<Quantity>, ToolkitError> {
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(bad_result(task, tokens));
    }
    tokens
        .chunks_exact(2)
        .map(|pair| {
            pair[0]
                .parse::<f64>()
                .map(|value| Quantity::new(value, pair[1]))
                .map_err(|_| bad_result(task, tokens))
        })
        .collect()
}

fn print_quantity(var: &str) -> [String; 2] {
    [
        format!("float({var}['value'])"),
        format!("str({var}['unit'])"),
    ]
}

impl CasaToolkit {
    /// A toolkit running `executable` with the default flags.
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.workdir {
            Some(workdir) => workdir.join(path),
            None => Path::new(path).to_path_buf(),
        }
    }

    /// Run `statements` in a casa process, returning its stdout.
    fn run(&self, task: &str, statements: &[String]) -> Result<String, ToolkitError> {
        let script = script(statements);
        debug!("casa {}:\n{}", task, script);

        let mut command = Command::new(&self.executable);
        command.args(&self.flags).arg("-c").arg(&script);
        if let Some(workdir) = &self.workdir {
            command.current_dir(workdir);
        }
        let output = command.output().map_err(|source| ToolkitError::Launch {
            executable: self.executable.clone(),
            task: task.to_string(),
            source,
        })?;
        trace!("casa {} finished with {}", task, output.status);

        if !output.status.success() {
            return Err(ToolkitError::TaskFailed {
                task: task.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_call(&self, call: TaskCall) -> Result<(), ToolkitError> {
        let name = call.name.clone();
        self.run(&name, &[call.to_string()]).map(|_| ())
    }

    /// Run `statements`, then parse the tokens printed by the final statement.
    fn query<T>(
        &self,
        task: &str,
        statements: &[String],
        parse: impl FnOnce(&str, &[&str]) -> Result<T, ToolkitError>,
    ) -> Result<T, ToolkitError> {
        let stdout = self.run(task, statements)?;
        let tokens = result_tokens(task, &stdout)?;
        parse(task, &tokens)
    }

    fn imhead(imagename: &str, hdkey: &str) -> TaskCall {
        TaskCall::new("imhead")
            .arg("imagename", imagename)
            .arg("mode", "get")
            .arg("hdkey", hdkey)
    }
}

impl Toolkit for CasaToolkit {
    fn tclean(&self, params: &TcleanParams) -> Result<(), ToolkitError> {
        self.run_call(params.into())
    }

    fn gaincal(&self, params: &GaincalParams) -> Result<(), ToolkitError> {
        self.run_call(params.into())
    }

    fn applycal(&self, params: &ApplycalParams) -> Result<(), ToolkitError> {
        self.run_call(params.into())
    }

    fn flagmanager(&self, vis: &str, action: &FlagVersionAction) -> Result<(), ToolkitError> {
        let call = TaskCall::new("flagmanager").arg("vis", vis);
        let call = match action {
            FlagVersionAction::Save {
                versionname,
                replace,
            } => {
                let call = call.arg("mode", "save").arg("versionname", versionname);
                if *replace {
                    call.arg("merge", "replace")
                } else {
                    call
                }
            }
            FlagVersionAction::Restore { versionname } => {
                call.arg("mode", "restore").arg("versionname", versionname)
            }
        };
        self.run_call(call)
    }

    fn rmtables(&self, table: &str) -> Result<(), ToolkitError> {
        self.run_call(TaskCall::new("rmtables").arg("tablenames", table))
    }

    fn clearcal(&self, vis: &str) -> Result<(), ToolkitError> {
        self.run_call(TaskCall::new("clearcal").arg("vis", vis))
    }

    fn delmod(&self, vis: &str, otf: bool) -> Result<(), ToolkitError> {
        self.run_call(TaskCall::new("delmod").arg("vis", vis).arg("otf", otf))
    }

    fn plotcal(&self, params: &PlotcalParams) -> Result<(), ToolkitError> {
        self.run_call(params.into())
    }

    fn split(&self, vis: &str, outputvis: &str, datacolumn: &str) -> Result<(), ToolkitError> {
        self.run_call(
            TaskCall::new("split")
                .arg("vis", vis)
                .arg("outputvis", outputvis)
                .arg("datacolumn", datacolumn),
        )
    }

    fn importfits(&self, fitsimage: &str, imagename: &str) -> Result<(), ToolkitError> {
        self.run_call(
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
        self.run_call(
            TaskCall::new("exportfits")
                .arg("imagename", imagename)
                .arg("fitsimage", fitsimage)
                .arg("overwrite", overwrite)
                .arg("history", history),
        )
    }

    fn image_shape(&self, image: &str) -> Result<Vec<usize>, ToolkitError> {
        self.query(
            "imhead",
            &[
                format!("_r = {}", Self::imhead(image, "shape")),
                report(&["*[int(v) for v in _r]"]),
            ],
            parse_shape,
        )
    }

    fn image_header_quantity(&self, image: &str, key: &str) -> Result<Quantity, ToolkitError> {
        let [value, unit] = print_quantity("_r");
        self.query(
            "imhead",
            &[
                format!("_r = {}", Self::imhead(image, key)),
                report(&[&value, &unit]),
            ],
            |task, tokens| {
                parse_quantities(task, tokens)?
                    .pop()
                    .ok_or_else(|| bad_result(task, tokens))
            },
        )
    }

    fn restoring_beam(&self, image: &str) -> Result<Beam, ToolkitError> {
        let [major_v, major_u] = print_quantity("_r['major']");
        let [minor_v, minor_u] = print_quantity("_r['minor']");
        let [pa_v, pa_u] = print_quantity("_r['positionangle']");
        self.query(
            "ia.restoringbeam",
            &[
                TaskCall::new("ia.open").arg("infile", image).to_string(),
                "_r = ia.restoringbeam()".to_string(),
                "ia.done()".to_string(),
                report(&[&major_v, &major_u, &minor_v, &minor_u, &pa_v, &pa_u]),
            ],
            |task, tokens| match parse_quantities(task, tokens)?.as_slice() {
                [major, minor, pa] => Ok(Beam {
                    major: major.clone(),
                    minor: minor.clone(),
                    pa: pa.clone(),
                }),
                _ => Err(bad_result(task, tokens)),
            },
        )
    }

    fn set_restoring_beam(&self, image: &str, beam: &Beam) -> Result<(), ToolkitError> {
        self.run(
            "ia.setrestoringbeam",
            &[
                TaskCall::new("ia.open").arg("infile", image).to_string(),
                TaskCall::new("ia.setrestoringbeam")
                    .arg("major", beam.major.to_string())
                    .arg("minor", beam.minor.to_string())
                    .arg("pa", beam.pa.to_string())
                    .to_string(),
                "ia.done()".to_string(),
            ],
        )
        .map(|_| ())
    }

    fn convolve2d(&self, image: &str, outfile: &str, beam: &Beam) -> Result<(), ToolkitError> {
        let axes: &[usize] = &[0, 1];
        let convolve = TaskCall::new("ia.convolve2d")
            .arg("outfile", outfile)
            .arg("axes", axes)
            .arg("type", "gauss")
            .arg("major", beam.major.to_string())
            .arg("minor", beam.minor.to_string())
            .arg("pa", beam.pa.to_string())
            .arg("overwrite", true);
        self.run(
            "ia.convolve2d",
            &[
                TaskCall::new("ia.open").arg("infile", image).to_string(),
                format!("_c = {convolve}"),
                "_c.done()".to_string(),
                "ia.done()".to_string(),
            ],
        )
        .map(|_| ())
    }

    fn immath(&self, images: &[String], expr: &str, outfile: &str) -> Result<(), ToolkitError> {
        self.run_call(
            TaskCall::new("immath")
                .arg("imagename", images)
                .arg("expr", expr)
                .arg("outfile", outfile),
        )
    }

    fn image_pixels(&self, image: &str) -> Result<Array2<f32>, ToolkitError> {
        if image.ends_with(".fits") {
            return Ok(read_fits_plane(self.resolve(image))?);
        }
        let fitsimage = format!("{image}.pixels.fits");
        self.exportfits(image, &fitsimage, true, false)?;
        Ok(read_fits_plane(self.resolve(&fitsimage))?)
    }

    fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }
}
