//! Dosage engine.
//!
//! Pure arithmetic over mmol/L values. Inputs are validated by the caller:
//! a zero carb ratio or ISF gives a non-finite result, not an error.
//!
//! ## Correction policy
//!
//! - Readings inside the target band [4.0, 8.0] mmol/L get no correction.
//! - Readings below the band also get no correction. Lows are never
//!   corrected with a negative dose.
//! - Above the band: `(bg - target) / isf`.

use crate::settings::InsulinSettings;
use crate::types::{Correction, EntryType, LogEntry, MealCarbs};
use crate::units::{self, GlucoseUnit};

/// Lower bound of the target band, mmol/L
pub const TARGET_BAND_LOW: f64 = 4.0;
/// Upper bound of the target band, mmol/L
pub const TARGET_BAND_HIGH: f64 = 8.0;

/// Insulin units to cover `carb_amount` grams
pub fn meal_dosage(carb_amount: f64, carb_ratio: f64) -> f64 {
    carb_amount / carb_ratio
}

/// Insulin units to bring `bg_level` down to `target`
///
/// `bg_level` is re-normalized from `unit` first; for an already
/// normalized entry `unit` is mmol/L and this is a no-op.
pub fn correction_dosage(bg_level: f64, isf: i32, target: f64, unit: GlucoseUnit) -> f64 {
    let bg_level = units::to_canonical(bg_level, unit);

    if (TARGET_BAND_LOW..=TARGET_BAND_HIGH).contains(&bg_level) {
        return 0.0;
    }
    if bg_level < TARGET_BAND_LOW {
        return 0.0;
    }

    (bg_level - target) / f64::from(isf)
}

/// Meal plus correction, rounded to the nearest half unit
pub fn total_dosage(
    carb_amount: f64,
    carb_ratio: f64,
    isf: i32,
    bg_level: f64,
    target: f64,
    unit: GlucoseUnit,
) -> f64 {
    let meal = meal_dosage(carb_amount, carb_ratio);
    let correction = correction_dosage(bg_level, isf, target, unit);
    round_to_half(meal + correction)
}

/// Round half away from zero on the doubled value
pub fn round_to_half(dosage: f64) -> f64 {
    (dosage * 2.0).round() / 2.0
}

/// Fill in the correction and total dosage fields of an entry
///
/// - bg and target present: correction recorded, total = rounded correction
/// - carbs present: total = meal + correction, rounded
/// - otherwise only a correction entry keeps a total
pub fn calculate_dosages(entry: &mut LogEntry, isf: i32) {
    match (entry.blood_glucose_level, entry.target_blood_glucose) {
        (Some(bg), Some(target)) => {
            let dosage = correction_dosage(bg, isf, target, entry.unit);
            entry.correction = Some(Correction {
                factor: isf,
                dosage,
            });
            entry.total_dosage = Some(round_to_half(dosage));
        }
        _ => {
            entry.correction = None;
            entry.total_dosage = None;
        }
    }

    if let Some(meal) = entry.meal {
        let total = match (entry.blood_glucose_level, entry.target_blood_glucose) {
            (Some(bg), Some(target)) => {
                total_dosage(meal.carbs, meal.carb_ratio, isf, bg, target, entry.unit)
            }
            _ => round_to_half(meal_dosage(meal.carbs, meal.carb_ratio)),
        };
        entry.total_dosage = Some(total);
    } else if entry.entry_type != EntryType::Correction {
        entry.total_dosage = None;
    }
}

/// Build a normalized entry from a reading in the user's preferred unit
///
/// `carbs` is only used by meals and snacks. No dosage is computed for
/// `other` entries.
pub fn prepare_entry(
    settings: &InsulinSettings,
    entry_type: EntryType,
    blood_glucose: f64,
    carbs: Option<f64>,
) -> LogEntry {
    let mut entry = LogEntry::new(entry_type, settings.unit);
    entry.blood_glucose_level = Some(blood_glucose);

    if entry_type.uses_target() {
        entry.target_blood_glucose = Some(settings.target_blood_glucose);
    }
    entry.normalize();

    if entry_type.takes_carbs() {
        entry.meal = carbs.map(|carbs| MealCarbs {
            carbs,
            carb_ratio: settings.carb_ratio,
        });
    }

    if entry_type != EntryType::Other {
        calculate_dosages(&mut entry, settings.insulin_sensitivity_factor);
    }

    tracing::debug!(
        "Prepared {} entry, total dosage {:?}",
        entry.entry_type,
        entry.total_dosage
    );
    entry
}
