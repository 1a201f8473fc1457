//! Reconstruction quality statistics.

use std::fmt::Display;

use thiserror::Error;

use crate::ndarray::{s, ArrayView2};

/// The default side length of the residual box the noise is measured in.
pub const DEFAULT_STDV_PIXELS: usize = 80;

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors that can occur deriving statistics
pub enum StatsError {
    /// The signal image has no finite pixels to take a peak from.
    #[error("the signal image has no finite pixels")]
    EmptyImage,

    /// The residual's noise box is flat, so the signal to noise ratio is undefined.
    #[error("the noise in the residual box ({pixels}x{pixels} pixels) is zero or not finite")]
    ZeroNoise {
        /// side length of the box
        pixels: usize,
    },
}

/// How good a reconstruction is, by comparing the restored image to its residual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructionStatistics {
    /// peak signal to noise ratio, `peak / stdv`
    pub psnr: f64,
    /// brightest pixel of the restored image
    pub peak: f64,
    /// standard deviation of the residual in the noise box
    pub stdv: f64,
}

impl ReconstructionStatistics {
    /// Derive statistics from a restored (signal) image and its residual.
    ///
    /// The peak is taken over the whole signal image. The noise is the population standard
    /// deviation of the top-left `stdv_pixels` x `stdv_pixels` box of the residual, clipped to
    /// the image. Non-finite pixels (blanked regions) are ignored.
    ///
    /// # Errors
    ///
    /// - [`StatsError::EmptyImage`] if the signal has no finite pixels
    /// - [`StatsError::ZeroNoise`] if the noise box is empty or flat
    pub fn from_images(
        signal: ArrayView2<f32>,
        residual: ArrayView2<f32>,
        stdv_pixels: usize,
    ) -> Result<Self, StatsError> {
        let peak = signal
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| v as f64)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .ok_or(StatsError::EmptyImage)?;

        let (ny, nx) = residual.dim();
        let noise_box = residual.slice(s![..stdv_pixels.min(ny), ..stdv_pixels.min(nx)]);
        let (count, sum, sum_sq) = noise_box
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| v as f64)
            .fold((0_usize, 0.0, 0.0), |(n, s, s2), v| (n + 1, s + v, s2 + v * v));
        if count == 0 {
            return Err(StatsError::ZeroNoise {
                pixels: stdv_pixels,
            });
        }
        let mean = sum / count as f64;
        let stdv = (sum_sq / count as f64 - mean * mean).max(0.0).sqrt();
        if !(stdv.is_finite() && stdv > 0.0) {
            return Err(StatsError::ZeroNoise {
                pixels: stdv_pixels,
            });
        }

        Ok(Self {
            psnr: peak / stdv,
            peak,
            stdv,
        })
    }
}

impl Display for ReconstructionStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "psnr={:.3} peak={:.6e} stdv={:.6e}",
            self.psnr, self.peak, self.stdv
        )
    }
}
