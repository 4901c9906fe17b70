//! Text grammar of a log record.
//!
//! ```text
//! record     = header LF LF detail*
//! header     = "Log Entry Time: " YYYY-MM-DD " " HH:MM:SS
//! detail     = glucose / target / carbs / factor / correction / total / type
//! glucose    = "Blood Glucose: " float " mmol/L" LF
//! target     = "Target: " float " mmol/L" LF
//! carbs      = "Carbs: " float " g, Carb Ratio: " float "/unit" LF
//! factor     = "Correction Factor: " int " mmol/L/unit" LF
//! correction = "Correction Dosage: " float " units" LF
//! total      = "Total Insulin Dosage: " float " units" LF
//! type       = "Type: " text LF
//! ```
//!
//! Floats are written with two decimals. Glucose values are always mmol/L.
//! When reading, out-of-range timestamp fields roll over into the next
//! larger unit, so `2024-02-30 10:00:00` reads as March 1st.
//! Both the writer and the reader go through `RecordLine`, so the literal
//! text of each line lives only here.

use crate::types::LogEntry;
use crate::units::{self, GlucoseUnit};
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::fmt;

/// Timestamp layout used in record headers
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const HEADER: &str = "Log Entry Time:";
const BLOOD_GLUCOSE: &str = "Blood Glucose:";
const TARGET: &str = "Target:";
const CARBS: &str = "Carbs:";
const CARB_RATIO: &str = " g, Carb Ratio:";
const CORRECTION_FACTOR: &str = "Correction Factor:";
const CORRECTION_DOSAGE: &str = "Correction Dosage:";
const TOTAL_DOSAGE: &str = "Total Insulin Dosage:";
const TYPE: &str = "Type:";

/// One line of the log file
#[derive(Clone, Debug, PartialEq)]
pub enum RecordLine {
    Timestamp(NaiveDateTime),
    BloodGlucose(f64),
    Target(f64),
    Carbs { carbs: f64, carb_ratio: f64 },
    CorrectionFactor(i32),
    CorrectionDosage(f64),
    TotalDosage(f64),
    Type(String),
}

impl fmt::Display for RecordLine {
    /// Wire format, without the trailing newline
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordLine::Timestamp(ts) => {
                write!(f, "{} {}", HEADER, ts.format(TIMESTAMP_FORMAT))
            }
            RecordLine::BloodGlucose(v) => write!(f, "{} {:.2} mmol/L", BLOOD_GLUCOSE, v),
            RecordLine::Target(v) => write!(f, "{} {:.2} mmol/L", TARGET, v),
            RecordLine::Carbs { carbs, carb_ratio } => {
                write!(f, "{} {:.2}{} {:.2}/unit", CARBS, carbs, CARB_RATIO, carb_ratio)
            }
            RecordLine::CorrectionFactor(v) => {
                write!(f, "{} {} mmol/L/unit", CORRECTION_FACTOR, v)
            }
            RecordLine::CorrectionDosage(v) => write!(f, "{} {:.2} units", CORRECTION_DOSAGE, v),
            RecordLine::TotalDosage(v) => write!(f, "{} {:.2} units", TOTAL_DOSAGE, v),
            RecordLine::Type(t) => write!(f, "{} {}", TYPE, t),
        }
    }
}

fn malformed(line_num: usize, what: &str, line: &str) -> Error {
    Error::Parse {
        line: line_num,
        message: format!("malformed {}: {:?}", what, line),
    }
}

/// Header timestamp with calendar normalization
///
/// Each of the six fields is read as an integer and added as an offset from
/// the first of the month, so `2024-02-30` is `2024-03-01` and `23:59:60`
/// rolls into the next minute.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let (date, time) = text.trim().split_once(' ')?;
    let fields = |text: &str, sep: char| -> Option<[i64; 3]> {
        let values: Vec<i64> = text
            .trim()
            .split(sep)
            .map(|f| f.trim().parse().ok())
            .collect::<Option<_>>()?;
        values.try_into().ok()
    };
    let [year, month, day] = fields(date, '-')?;
    let [hour, minute, second] = fields(time, ':')?;

    let months = year.checked_mul(12)?.checked_add(month.checked_sub(1)?)?;
    let first = NaiveDate::from_ymd_opt(
        i32::try_from(months.div_euclid(12)).ok()?,
        u32::try_from(months.rem_euclid(12) + 1).ok()?,
        1,
    )?;
    let offset = TimeDelta::try_days(day.checked_sub(1)?)?
        .checked_add(&TimeDelta::try_hours(hour)?)?
        .checked_add(&TimeDelta::try_minutes(minute)?)?
        .checked_add(&TimeDelta::try_seconds(second)?)?;

    first.and_time(NaiveTime::MIN).checked_add_signed(offset)
}

/// Trimmed value in front of `suffix`
fn field<'a>(rest: &'a str, suffix: &str) -> Option<&'a str> {
    rest.trim_end().strip_suffix(suffix).map(str::trim)
}

impl RecordLine {
    /// Whether `line` starts a new record
    pub fn is_header(line: &str) -> bool {
        line.starts_with(HEADER)
    }

    /// Parse a line of the log file
    ///
    /// `Ok(None)` for lines that are not part of the grammar (the blank line
    /// after a header, stray text). A recognized line with a bad value is a
    /// `Parse` error carrying `line_num`.
    pub fn parse(line: &str, line_num: usize) -> Result<Option<RecordLine>> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);

        if let Some(rest) = line.strip_prefix(HEADER) {
            return parse_timestamp(rest)
                .map(|ts| Some(RecordLine::Timestamp(ts)))
                .ok_or_else(|| malformed(line_num, "log entry time", line));
        }

        if let Some(rest) = line.strip_prefix(BLOOD_GLUCOSE) {
            return field(rest, "mmol/L")
                .and_then(|v| v.parse().ok())
                .map(|v| Some(RecordLine::BloodGlucose(v)))
                .ok_or_else(|| malformed(line_num, "blood glucose", line));
        }

        if let Some(rest) = line.strip_prefix(TARGET) {
            return field(rest, "mmol/L")
                .and_then(|v| v.parse().ok())
                .map(|v| Some(RecordLine::Target(v)))
                .ok_or_else(|| malformed(line_num, "target", line));
        }

        if let Some(rest) = line.strip_prefix(CARBS) {
            let parsed = rest.split_once(CARB_RATIO).and_then(|(carbs, ratio)| {
                let carbs = carbs.trim().parse().ok()?;
                let carb_ratio = field(ratio, "/unit")?.parse().ok()?;
                Some(RecordLine::Carbs { carbs, carb_ratio })
            });
            return parsed
                .map(Some)
                .ok_or_else(|| malformed(line_num, "carbs", line));
        }

        if let Some(rest) = line.strip_prefix(CORRECTION_FACTOR) {
            return field(rest, "mmol/L/unit")
                .and_then(|v| v.parse().ok())
                .map(|v| Some(RecordLine::CorrectionFactor(v)))
                .ok_or_else(|| malformed(line_num, "correction factor", line));
        }

        if let Some(rest) = line.strip_prefix(CORRECTION_DOSAGE) {
            return field(rest, "units")
                .and_then(|v| v.parse().ok())
                .map(|v| Some(RecordLine::CorrectionDosage(v)))
                .ok_or_else(|| malformed(line_num, "correction dosage", line));
        }

        if let Some(rest) = line.strip_prefix(TOTAL_DOSAGE) {
            return field(rest, "units")
                .and_then(|v| v.parse().ok())
                .map(|v| Some(RecordLine::TotalDosage(v)))
                .ok_or_else(|| malformed(line_num, "total insulin dosage", line));
        }

        if let Some(rest) = line.strip_prefix(TYPE) {
            return Ok(Some(RecordLine::Type(rest.trim().to_string())));
        }

        Ok(None)
    }

    /// Human-readable form with glucose values converted to `unit`
    pub fn display(&self, unit: GlucoseUnit) -> String {
        match self {
            RecordLine::BloodGlucose(v) => {
                format!("Blood Glucose Level: {:.2} {}", units::to_display(*v, unit), unit)
            }
            RecordLine::Target(v) => {
                format!("Target: {:.2} {}", units::to_display(*v, unit), unit)
            }
            other => other.to_string(),
        }
    }
}

/// Detail lines of an entry, in file order
///
/// A bare `Type` line closes the record when blood glucose was logged
/// without correction or meal data.
pub fn detail_lines(entry: &LogEntry) -> Vec<RecordLine> {
    let mut lines = Vec::new();

    if let Some(bg) = entry.blood_glucose_level {
        lines.push(RecordLine::BloodGlucose(bg));
    }
    if let Some(target) = entry.target_blood_glucose {
        lines.push(RecordLine::Target(target));
    }
    if let Some(meal) = entry.meal {
        lines.push(RecordLine::Carbs {
            carbs: meal.carbs,
            carb_ratio: meal.carb_ratio,
        });
    }
    if let Some(correction) = entry.correction {
        lines.push(RecordLine::CorrectionFactor(correction.factor));
        lines.push(RecordLine::CorrectionDosage(correction.dosage));
    }
    if let Some(total) = entry.total_dosage {
        lines.push(RecordLine::TotalDosage(total));
        lines.push(RecordLine::Type(entry.entry_type.to_string()));
    }
    if entry.blood_glucose_level.is_some() && entry.correction.is_none() && entry.meal.is_none() {
        lines.push(RecordLine::Type(entry.entry_type.to_string()));
    }

    lines
}

/// Full text of a record, ready to append
pub fn encode_record(entry: &LogEntry, timestamp: NaiveDateTime) -> String {
    let mut out = format!("{}\n\n", RecordLine::Timestamp(timestamp));
    for line in detail_lines(entry) {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}
