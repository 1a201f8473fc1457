use clap::ErrorKind::{DisplayHelp, DisplayVersion};
use log::{info, trace};
use selfcal::{
    cli::SelfcalContext,
    SelfcalError::{ClapError, DryRun},
};
use std::{env, ffi::OsString, fmt::Debug, time::Instant};

fn main_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    I: Debug,
{
    let selfcal_ctx = match SelfcalContext::from_args(args) {
        Ok(selfcal_ctx) => selfcal_ctx,
        Err(DryRun {}) => {
            info!("Dry run. Nothing will be calibrated.");
            return 0;
        }
        Err(ClapError(inner)) => {
            // Swallow broken pipe errors
            trace!("clap error: {:?}", inner.kind());
            let _ = inner.print();
            match inner.kind() {
                DisplayHelp | DisplayVersion => return 0,
                _ => return 1,
            }
        }
        Err(e) => {
            eprintln!("error parsing args: {e}");
            return 1;
        }
    };

    let start = Instant::now();
    match selfcal_ctx.run() {
        Ok(caltables) => {
            info!(
                "total duration: {:?} for {} rounds",
                start.elapsed(),
                caltables.len()
            );
            0
        }
        Err(e) => {
            eprintln!("self-calibration error: {e}");
            1
        }
    }
}

fn main() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    trace!("start main");
    let retcode = main_with_args(env::args());
    trace!("end main");
    std::process::exit(retcode);
}
