//! Quantities with units, as reported by image headers.

use std::fmt::{Display, Formatter};

use super::ToolkitError;

/// A value with an angular unit, e.g. a pixel scale or a beam axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    /// The magnitude
    pub value: f64,
    /// The unit, e.g. `"rad"`, `"deg"`, `"arcsec"`
    pub unit: String,
}

impl Quantity {
    /// Create a new quantity
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    /// Convert this quantity to the given angular unit.
    ///
    /// # Errors
    ///
    /// [`ToolkitError::UnknownUnit`] if either unit is not an angle this crate knows about.
    pub fn convert(&self, unit: &str) -> Result<Self, ToolkitError> {
        let unknown = || ToolkitError::UnknownUnit {
            from: self.unit.clone(),
            to: unit.to_string(),
        };
        let from = radians_per(&self.unit).ok_or_else(unknown)?;
        let to = radians_per(unit).ok_or_else(unknown)?;
        Ok(Self::new(self.value * from / to, unit))
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

/// The number of radians in one of `unit`.
fn radians_per(unit: &str) -> Option<f64> {
    match unit {
        "rad" => Some(1.0),
        "deg" => Some(std::f64::consts::PI / 180.0),
        "arcmin" => Some(std::f64::consts::PI / (180.0 * 60.0)),
        "arcsec" => Some(std::f64::consts::PI / (180.0 * 3600.0)),
        "mas" => Some(std::f64::consts::PI / (180.0 * 3600.0e3)),
        _ => None,
    }
}

/// An elliptical Gaussian restoring beam.
#[derive(Debug, Clone, PartialEq)]
pub struct Beam {
    /// FWHM of the major axis
    pub major: Quantity,
    /// FWHM of the minor axis
    pub minor: Quantity,
    /// position angle of the major axis
    pub pa: Quantity,
}

impl Display for Beam {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x {} @ {}", self.major, self.minor, self.pa)
    }
}
