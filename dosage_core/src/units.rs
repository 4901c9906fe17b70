//! Blood glucose unit conversion.
//!
//! Everything stored or computed is in mmol/L. mg/dL exists only at the
//! edges: readings typed by the user and lines shown back to them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// mg/dL per mmol/L
///
/// Not an exact constant, so a canonical round trip is only equal up to
/// floating-point rounding.
pub const MG_DL_PER_MMOL_L: f64 = 18.018;

/// Unit a blood glucose value is expressed in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlucoseUnit {
    #[default]
    #[serde(rename = "mmol/L")]
    MmolPerL,
    #[serde(rename = "mg/dL")]
    MgPerDl,
}

impl GlucoseUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlucoseUnit::MmolPerL => "mmol/L",
            GlucoseUnit::MgPerDl => "mg/dL",
        }
    }

    /// Lenient lookup: anything other than exactly `mg/dL` is canonical
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("mg/dL") => GlucoseUnit::MgPerDl,
            _ => GlucoseUnit::MmolPerL,
        }
    }
}

impl fmt::Display for GlucoseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GlucoseUnit {
    type Err = crate::Error;

    /// Strict parse, used when validating settings
    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "mmol/L" => Ok(GlucoseUnit::MmolPerL),
            "mg/dL" => Ok(GlucoseUnit::MgPerDl),
            other => Err(crate::Error::Config(format!(
                "Unknown blood glucose unit '{}' (expected mmol/L or mg/dL)",
                other
            ))),
        }
    }
}

/// Convert a value expressed in `unit` to mmol/L
pub fn to_canonical(value: f64, unit: GlucoseUnit) -> f64 {
    match unit {
        GlucoseUnit::MgPerDl => value / MG_DL_PER_MMOL_L,
        GlucoseUnit::MmolPerL => value,
    }
}

/// Convert a mmol/L value to `unit` for display
pub fn to_display(value: f64, unit: GlucoseUnit) -> f64 {
    match unit {
        GlucoseUnit::MgPerDl => value * MG_DL_PER_MMOL_L,
        GlucoseUnit::MmolPerL => value,
    }
}
