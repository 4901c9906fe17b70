//! Typed insulin settings on top of the settings file.
//!
//! Loading fails closed: a missing or non-positive tunable is an error,
//! never a default.

use crate::config_store::ConfigStore;
use crate::units::GlucoseUnit;
use crate::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const CARB_RATIO_KEY: &str = "carb ratio";
pub const ISF_KEY: &str = "insulin sensitivity factor";
pub const UNIT_KEY: &str = "blood glucose unit";
pub const TARGET_KEY: &str = "target blood glucose";

/// One of the four user tunables
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Setting {
    CarbRatio,
    InsulinSensitivityFactor,
    BloodGlucoseUnit,
    TargetBloodGlucose,
}

impl Setting {
    /// Key used in the settings file
    pub fn key(&self) -> &'static str {
        match self {
            Setting::CarbRatio => CARB_RATIO_KEY,
            Setting::InsulinSensitivityFactor => ISF_KEY,
            Setting::BloodGlucoseUnit => UNIT_KEY,
            Setting::TargetBloodGlucose => TARGET_KEY,
        }
    }

    /// Validate a raw value and return the text to store
    pub fn validate(&self, raw: &str) -> Result<String> {
        let raw = raw.trim();
        match self {
            Setting::CarbRatio | Setting::TargetBloodGlucose => {
                Ok(format!("{:.2}", parse_positive_float(self.key(), raw)?))
            }
            Setting::InsulinSensitivityFactor => {
                Ok(parse_positive_int(self.key(), raw)?.to_string())
            }
            Setting::BloodGlucoseUnit => Ok(raw.parse::<GlucoseUnit>()?.as_str().to_string()),
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Setting {
    type Err = Error;

    /// Accepts the file key or a dashed short name (`carb-ratio`, `isf`, ...)
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', " ").as_str() {
            CARB_RATIO_KEY => Ok(Setting::CarbRatio),
            ISF_KEY | "isf" => Ok(Setting::InsulinSensitivityFactor),
            UNIT_KEY | "unit" => Ok(Setting::BloodGlucoseUnit),
            TARGET_KEY | "target" => Ok(Setting::TargetBloodGlucose),
            _ => Err(Error::Config(format!("Unknown setting: {}", s))),
        }
    }
}

fn parse_positive_float(key: &str, raw: &str) -> Result<f64> {
    let value: f64 = raw
        .parse()
        .map_err(|_| Error::Config(format!("Invalid {} value: {:?}", key, raw)))?;
    check_positive_float(key, value)
}

fn parse_positive_int(key: &str, raw: &str) -> Result<i32> {
    let value: i32 = raw
        .parse()
        .map_err(|_| Error::Config(format!("Invalid {} value: {:?}", key, raw)))?;
    check_positive_int(key, value)
}

fn check_positive_float(key: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Config(format!("{} must be positive, got {}", key, value)));
    }
    Ok(value)
}

fn check_positive_int(key: &str, value: i32) -> Result<i32> {
    if value <= 0 {
        return Err(Error::Config(format!("{} must be positive, got {}", key, value)));
    }
    Ok(value)
}

/// Personal dosing parameters
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InsulinSettings {
    /// grams per unit
    pub carb_ratio: f64,
    /// mmol/L drop per unit
    pub insulin_sensitivity_factor: i32,
    /// Preferred display and input unit
    pub unit: GlucoseUnit,
    /// In `unit`, as the user configured it
    pub target_blood_glucose: f64,
}

impl InsulinSettings {
    /// Checked constructor; every numeric tunable must be positive
    pub fn new(
        carb_ratio: f64,
        insulin_sensitivity_factor: i32,
        unit: GlucoseUnit,
        target_blood_glucose: f64,
    ) -> Result<Self> {
        Ok(Self {
            carb_ratio: check_positive_float(CARB_RATIO_KEY, carb_ratio)?,
            insulin_sensitivity_factor: check_positive_int(ISF_KEY, insulin_sensitivity_factor)?,
            unit,
            target_blood_glucose: check_positive_float(TARGET_KEY, target_blood_glucose)?,
        })
    }

    /// Load all four tunables from the settings file
    pub fn load(store: &ConfigStore) -> Result<Self> {
        let carb_ratio = parse_positive_float(CARB_RATIO_KEY, &require(store, CARB_RATIO_KEY)?)?;
        let insulin_sensitivity_factor = parse_positive_int(ISF_KEY, &require(store, ISF_KEY)?)?;
        let unit = require(store, UNIT_KEY)?.parse::<GlucoseUnit>()?;
        let target_blood_glucose = parse_positive_float(TARGET_KEY, &require(store, TARGET_KEY)?)?;

        tracing::info!("Loaded insulin settings from {:?}", store.path());
        Ok(Self {
            carb_ratio,
            insulin_sensitivity_factor,
            unit,
            target_blood_glucose,
        })
    }

    /// Settings as file entries, in the order they are written
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (CARB_RATIO_KEY, format!("{:.2}", self.carb_ratio)),
            (ISF_KEY, self.insulin_sensitivity_factor.to_string()),
            (UNIT_KEY, self.unit.as_str().to_string()),
            (TARGET_KEY, format!("{:.2}", self.target_blood_glucose)),
        ]
    }
}

fn require(store: &ConfigStore, key: &str) -> Result<String> {
    store.get(key).map_err(|e| match e {
        Error::NotFound(key) => Error::Config(format!("Missing {} in {:?}", key, store.path())),
        other => other,
    })
}

/// Unit to show query results in; an absent key means mmol/L
pub fn display_unit(store: &ConfigStore) -> Result<GlucoseUnit> {
    match store.get(UNIT_KEY) {
        Ok(label) => Ok(GlucoseUnit::from_label(Some(&label))),
        Err(Error::NotFound(_)) => Ok(GlucoseUnit::from_label(None)),
        Err(e) => Err(e),
    }
}
