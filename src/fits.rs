//! Reading image pixels out of FITS files.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{
    marlu::fitsio::{hdu::HduInfo, FitsFile},
    ndarray::Array2,
};

#[derive(Error, Debug)]
/// Errors that can occur reading a FITS image
pub enum FitsReadError {
    /// Error when opening a fits file.
    #[error("Couldn't open {fits_filename}: {fits_error}")]
    Open {
        /// The [`fitsio::errors::Error`](crate::marlu::fitsio::errors::Error)
        fits_error: Box<crate::marlu::fitsio::errors::Error>,
        /// The filename of the fits file
        fits_filename: PathBuf,
    },

    /// A generic error associated with the fitsio crate.
    #[error("{fits_filename} primary HDU: {fits_error}")]
    Fitsio {
        /// The [`fitsio::errors::Error`](crate::marlu::fitsio::errors::Error)
        fits_error: Box<crate::marlu::fitsio::errors::Error>,
        /// The filename of the fits file
        fits_filename: PathBuf,
    },

    /// The primary HDU isn't an image with at least two axes.
    #[error("{fits_filename} primary HDU: expected an image with at least 2 axes, found shape {shape:?}")]
    NotImage {
        /// The filename of the fits file
        fits_filename: PathBuf,
        /// The shape that was found
        shape: Vec<usize>,
    },
}

/// Read the first plane of the primary image of a FITS file.
///
/// FITS images written by imaging tasks usually carry degenerate frequency and Stokes axes
/// (`NAXIS3`, `NAXIS4`). Only the first `[NAXIS2][NAXIS1]` plane is returned.
///
/// # Errors
///
/// Will return a [`FitsReadError`] if the file can't be opened, the primary HDU isn't an image, or
/// the data can't be read.
pub fn read_fits_plane<P: AsRef<Path>>(path: P) -> Result<Array2<f32>, FitsReadError> {
    let path = path.as_ref();
    let fitsio_err = |e| FitsReadError::Fitsio {
        fits_error: Box::new(e),
        fits_filename: path.to_path_buf(),
    };

    let mut fptr = FitsFile::open(path).map_err(|e| FitsReadError::Open {
        fits_error: Box::new(e),
        fits_filename: path.to_path_buf(),
    })?;
    let hdu = fptr.primary_hdu().map_err(fitsio_err)?;
    // fitsio reports the slowest axis first.
    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() >= 2 => shape.clone(),
        HduInfo::ImageInfo { shape, .. } => {
            return Err(FitsReadError::NotImage {
                fits_filename: path.to_path_buf(),
                shape: shape.clone(),
            })
        }
        _ => {
            return Err(FitsReadError::NotImage {
                fits_filename: path.to_path_buf(),
                shape: vec![],
            })
        }
    };
    let (ny, nx) = (shape[shape.len() - 2], shape[shape.len() - 1]);
    let mut data: Vec<f32> = hdu.read_image(&mut fptr).map_err(fitsio_err)?;
    data.truncate(ny * nx);

    Array2::from_shape_vec((ny, nx), data).map_err(|_| FitsReadError::NotImage {
        fits_filename: path.to_path_buf(),
        shape,
    })
}
