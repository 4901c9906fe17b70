//! Core domain types for dosage logging.
//!
//! A `LogEntry` is built once per user action, normalized to mmol/L,
//! appended to the log and never touched again. Optional fields are
//! `Option`s: `None` means the field is absent for this event and is
//! neither written nor read back, which is different from a zero.

use crate::units::GlucoseUnit;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of event being logged
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Meal,
    Snack,
    Correction,
    Other,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Meal => "meal",
            EntryType::Snack => "snack",
            EntryType::Correction => "correction",
            EntryType::Other => "other",
        }
    }

    /// Meals and snacks carry a carbohydrate count
    pub fn takes_carbs(&self) -> bool {
        matches!(self, EntryType::Meal | EntryType::Snack)
    }

    /// Everything except `other` is corrected against the target
    pub fn uses_target(&self) -> bool {
        !matches!(self, EntryType::Other)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "meal" => Ok(EntryType::Meal),
            "snack" => Ok(EntryType::Snack),
            "correction" => Ok(EntryType::Correction),
            "other" => Ok(EntryType::Other),
            _ => Err(Error::UnknownEntryType(s.to_string())),
        }
    }
}

/// Carbohydrates eaten and the ratio they were dosed with
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MealCarbs {
    /// grams
    pub carbs: f64,
    /// grams per unit
    pub carb_ratio: f64,
}

/// Correction factor and the dosage it produced
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Correction {
    /// mmol/L per unit
    pub factor: i32,
    /// units
    pub dosage: f64,
}

/// One dosage event
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub entry_type: EntryType,
    /// Unit the glucose values below are expressed in
    pub unit: GlucoseUnit,
    pub blood_glucose_level: Option<f64>,
    pub target_blood_glucose: Option<f64>,
    pub meal: Option<MealCarbs>,
    pub correction: Option<Correction>,
    /// units
    pub total_dosage: Option<f64>,
}

impl LogEntry {
    /// Empty entry of the given type, values in `unit`
    pub fn new(entry_type: EntryType, unit: GlucoseUnit) -> Self {
        Self {
            entry_type,
            unit,
            blood_glucose_level: None,
            target_blood_glucose: None,
            meal: None,
            correction: None,
            total_dosage: None,
        }
    }

    /// Convert the glucose fields to mmol/L
    ///
    /// Idempotent: once normalized the entry's unit is mmol/L and a second
    /// call changes nothing.
    pub fn normalize(&mut self) {
        let unit = self.unit;
        self.blood_glucose_level = self
            .blood_glucose_level
            .map(|v| crate::units::to_canonical(v, unit));
        self.target_blood_glucose = self
            .target_blood_glucose
            .map(|v| crate::units::to_canonical(v, unit));
        self.unit = GlucoseUnit::MmolPerL;
    }

    pub fn is_normalized(&self) -> bool {
        self.unit == GlucoseUnit::MmolPerL
    }

    /// A dosage is worth suggesting when a total or correction was computed
    pub fn suggested_dosage(&self) -> Option<f64> {
        if self.total_dosage.is_some() || self.correction.is_some() {
            Some(self.total_dosage.unwrap_or(0.0))
        } else {
            None
        }
    }
}
