//! Append-only dosage log.
//!
//! Records are appended as text blocks (see `record`) under an exclusive
//! file lock. Queries stream the file once, in file order, and yield
//! display lines for the records inside a time window.

use crate::record::{self, RecordLine};
use crate::types::LogEntry;
use crate::units::GlucoseUnit;
use crate::{Error, Result};
use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime};
use fs2::FileExt;
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Entry sink trait for persisting dosage events
pub trait EntrySink {
    fn append(&mut self, entry: &LogEntry, timestamp: NaiveDateTime) -> Result<()>;
}

/// Relative window for a log query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeFilter {
    /// Since midnight today
    Day,
    /// Since the most recent Sunday, 00:00
    Week,
    /// Since the Sunday before this week's Sunday, 00:00
    ///
    /// Two full weeks plus the current partial one, not a rolling 14 days.
    TwoWeeks,
    /// Since the 1st of this month, 00:00
    Month,
}

impl TimeFilter {
    /// First instant inside the window, local time
    pub fn window_start(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        let since_sunday = i64::from(today.weekday().num_days_from_sunday());

        let start = match self {
            TimeFilter::Day => today,
            TimeFilter::Week => today - Duration::days(since_sunday),
            TimeFilter::TwoWeeks => today - Duration::days(since_sunday + 7),
            TimeFilter::Month => today - Duration::days(i64::from(today.day0())),
        };
        start.and_time(NaiveTime::MIN)
    }
}

impl FromStr for TimeFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(TimeFilter::Day),
            "week" => Ok(TimeFilter::Week),
            "2weeks" | "2 weeks" => Ok(TimeFilter::TwoWeeks),
            "month" => Ok(TimeFilter::Month),
            other => Err(Error::InvalidFilter(other.to_string())),
        }
    }
}

/// Text log of dosage events
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    /// Create a log store for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Records from the current `filter` window, relative to the local clock
    pub fn query(&self, filter: TimeFilter, unit: GlucoseUnit) -> Result<LogQuery> {
        self.query_at(filter, unit, Local::now().naive_local())
    }

    /// Records from the `filter` window relative to `now`
    ///
    /// Glucose lines are converted to `unit`. The returned iterator holds a
    /// shared lock on the file until it is dropped.
    pub fn query_at(
        &self,
        filter: TimeFilter,
        unit: GlucoseUnit,
        now: NaiveDateTime,
    ) -> Result<LogQuery> {
        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let start = filter.window_start(now);
        tracing::debug!("Querying {:?} from {} ({:?})", self.path, start, filter);

        Ok(LogQuery {
            reader: BufReader::new(file),
            buf: Vec::new(),
            start,
            unit,
            in_window: false,
            line_num: 0,
            done: false,
        })
    }
}

impl EntrySink for LogStore {
    fn append(&mut self, entry: &LogEntry, timestamp: NaiveDateTime) -> Result<()> {
        self.ensure_parent_dir()?;

        let entry = if entry.is_normalized() {
            Cow::Borrowed(entry)
        } else {
            let mut normalized = entry.clone();
            normalized.normalize();
            Cow::Owned(normalized)
        };
        let text = record::encode_record(&entry, timestamp);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Appended {} entry to {:?}", entry.entry_type, self.path);
        Ok(())
    }
}

/// One pass over the log, yielding display lines of in-window records
///
/// A malformed header yields a `Parse` error and the details under it are
/// suppressed; a malformed detail line inside the window yields a `Parse`
/// error. Either way the scan continues. Lines that are not valid UTF-8 count
/// as malformed. A read failure ends the scan.
pub struct LogQuery {
    reader: BufReader<File>,
    buf: Vec<u8>,
    start: NaiveDateTime,
    unit: GlucoseUnit,
    in_window: bool,
    line_num: usize,
    done: bool,
}

impl LogQuery {
    /// Error to yield for a bad line, or `None` when it is silently skipped
    fn reject(&mut self, is_header: bool, e: Error) -> Option<Error> {
        if is_header {
            self.in_window = false;
        } else if !self.in_window {
            return None;
        }
        tracing::warn!("Skipping log line: {}", e);
        Some(e)
    }
}

impl Iterator for LogQuery {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
            self.line_num += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line,
                Err(_) => {
                    let is_header = RecordLine::is_header(&String::from_utf8_lossy(&self.buf));
                    let e = Error::Parse {
                        line: self.line_num,
                        message: "invalid UTF-8".into(),
                    };
                    match self.reject(is_header, e) {
                        Some(e) => return Some(Err(e)),
                        None => continue,
                    }
                }
            };

            match RecordLine::parse(line, self.line_num) {
                Ok(Some(RecordLine::Timestamp(ts))) => {
                    self.in_window = ts >= self.start;
                    if self.in_window {
                        return Some(Ok(RecordLine::Timestamp(ts).display(self.unit)));
                    }
                }
                Ok(Some(detail)) => {
                    if self.in_window {
                        return Some(Ok(detail.display(self.unit)));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let is_header = RecordLine::is_header(line);
                    if let Some(e) = self.reject(is_header, e) {
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryType;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn glucose_entry(bg: f64) -> LogEntry {
        let mut entry = LogEntry::new(EntryType::Other, GlucoseUnit::MmolPerL);
        entry.blood_glucose_level = Some(bg);
        entry
    }

    fn ok_lines(query: LogQuery) -> Vec<String> {
        query.filter_map(|r| r.ok()).collect()
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("day".parse::<TimeFilter>().unwrap(), TimeFilter::Day);
        assert_eq!("2weeks".parse::<TimeFilter>().unwrap(), TimeFilter::TwoWeeks);
        assert_eq!("2 weeks".parse::<TimeFilter>().unwrap(), TimeFilter::TwoWeeks);
        assert!(matches!(
            "fortnight".parse::<TimeFilter>(),
            Err(Error::InvalidFilter(ref f)) if f == "fortnight"
        ));
    }

    #[test]
    fn test_window_starts() {
        // Wednesday
        let now = at(2024, 3, 13, 15, 42);

        assert_eq!(TimeFilter::Day.window_start(now), at(2024, 3, 13, 0, 0));
        assert_eq!(TimeFilter::Week.window_start(now), at(2024, 3, 10, 0, 0));
        assert_eq!(TimeFilter::TwoWeeks.window_start(now), at(2024, 3, 3, 0, 0));
        assert_eq!(TimeFilter::Month.window_start(now), at(2024, 3, 1, 0, 0));
    }

    #[test]
    fn test_week_starts_today_on_sunday() {
        let sunday = at(2024, 3, 10, 9, 0);
        assert_eq!(TimeFilter::Week.window_start(sunday), at(2024, 3, 10, 0, 0));
        assert_eq!(TimeFilter::TwoWeeks.window_start(sunday), at(2024, 3, 3, 0, 0));
    }

    #[test]
    fn test_windows_cross_month_and_year() {
        // Tuesday
        let now = at(2024, 1, 2, 8, 0);
        assert_eq!(TimeFilter::Week.window_start(now), at(2023, 12, 31, 0, 0));
        assert_eq!(TimeFilter::TwoWeeks.window_start(now), at(2023, 12, 24, 0, 0));
        assert_eq!(TimeFilter::Month.window_start(now), at(2024, 1, 1, 0, 0));
    }

    #[test]
    fn test_append_glucose_only_entry() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("data").join("logs.txt");

        let mut store = LogStore::new(&log_path);
        store.append(&glucose_entry(5.5), at(2024, 3, 13, 7, 30)).unwrap();

        assert_eq!(
            std::fs::read_to_string(&log_path).unwrap(),
            "Log Entry Time: 2024-03-13 07:30:00\n\nBlood Glucose: 5.50 mmol/L\nType: other\n"
        );
    }

    #[test]
    fn test_append_normalizes_foreign_unit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("logs.txt");

        let mut entry = LogEntry::new(EntryType::Other, GlucoseUnit::MgPerDl);
        entry.blood_glucose_level = Some(180.18);

        let mut store = LogStore::new(&log_path);
        store.append(&entry, at(2024, 3, 13, 7, 30)).unwrap();

        let text = std::fs::read_to_string(&log_path).unwrap();
        assert!(text.contains("Blood Glucose: 10.00 mmol/L\n"), "{}", text);
    }

    #[test]
    fn test_query_day_returns_only_today() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = LogStore::new(temp_dir.path().join("logs.txt"));

        store.append(&glucose_entry(9.1), at(2024, 3, 12, 22, 0)).unwrap();
        store.append(&glucose_entry(5.2), at(2024, 3, 13, 7, 0)).unwrap();

        let lines = ok_lines(
            store
                .query_at(TimeFilter::Day, GlucoseUnit::MmolPerL, at(2024, 3, 13, 12, 0))
                .unwrap(),
        );

        assert_eq!(
            lines,
            vec![
                "Log Entry Time: 2024-03-13 07:00:00",
                "Blood Glucose Level: 5.20 mmol/L",
                "Type: other",
            ]
        );
    }

    #[test]
    fn test_query_keeps_file_order_across_windows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = LogStore::new(temp_dir.path().join("logs.txt"));

        store.append(&glucose_entry(6.0), at(2024, 3, 11, 8, 0)).unwrap();
        store.append(&glucose_entry(7.0), at(2024, 2, 20, 8, 0)).unwrap();
        store.append(&glucose_entry(8.0), at(2024, 3, 12, 8, 0)).unwrap();

        let lines = ok_lines(
            store
                .query_at(TimeFilter::Week, GlucoseUnit::MmolPerL, at(2024, 3, 13, 12, 0))
                .unwrap(),
        );
        let headers: Vec<_> = lines.iter().filter(|l| l.starts_with("Log Entry")).collect();

        assert_eq!(
            headers,
            vec![
                "Log Entry Time: 2024-03-11 08:00:00",
                "Log Entry Time: 2024-03-12 08:00:00",
            ]
        );
        assert!(!lines.iter().any(|l| l.contains("7.00")));
    }

    #[test]
    fn test_query_converts_glucose_to_display_unit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = LogStore::new(temp_dir.path().join("logs.txt"));

        let settings = crate::settings::InsulinSettings {
            carb_ratio: 10.0,
            insulin_sensitivity_factor: 2,
            unit: GlucoseUnit::MmolPerL,
            target_blood_glucose: 6.0,
        };
        let entry = crate::engine::prepare_entry(&settings, EntryType::Meal, 10.0, Some(50.0));
        store.append(&entry, at(2024, 3, 13, 12, 30)).unwrap();

        let lines = ok_lines(
            store
                .query_at(TimeFilter::Month, GlucoseUnit::MgPerDl, at(2024, 3, 13, 13, 0))
                .unwrap(),
        );

        assert_eq!(
            lines,
            vec![
                "Log Entry Time: 2024-03-13 12:30:00",
                "Blood Glucose Level: 180.18 mg/dL",
                "Target: 108.11 mg/dL",
                "Carbs: 50.00 g, Carb Ratio: 10.00/unit",
                "Correction Factor: 2 mmol/L/unit",
                "Correction Dosage: 2.00 units",
                "Total Insulin Dosage: 7.00 units",
                "Type: meal",
            ]
        );
    }

    #[test]
    fn test_bad_header_reported_and_scan_continues() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("logs.txt");
        std::fs::write(
            &log_path,
            "Log Entry Time: 2024-03-13 07:00:00\n\n\
Blood Glucose: 5.00 mmol/L\n\
Type: other\n\
Log Entry Time: yesterday-ish\n\n\
Blood Glucose: 15.00 mmol/L\n\
Type: other\n\
Log Entry Time: 2024-03-13 09:00:00\n\n\
Blood Glucose: 6.00 mmol/L\n\
Type: other\n",
        )
        .unwrap();

        let store = LogStore::new(&log_path);
        let results: Vec<_> = store
            .query_at(TimeFilter::Day, GlucoseUnit::MmolPerL, at(2024, 3, 13, 12, 0))
            .unwrap()
            .collect();

        let errors: Vec<_> = results.iter().filter(|r| r.is_err()).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Err(Error::Parse { line: 5, .. })));

        let lines: Vec<_> = results.into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(lines.len(), 6);
        assert!(!lines.iter().any(|l| l.contains("15.00")));
        assert_eq!(lines[3], "Log Entry Time: 2024-03-13 09:00:00");
    }

    #[test]
    fn test_bad_detail_outside_window_is_silent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("logs.txt");
        std::fs::write(
            &log_path,
            "Log Entry Time: 2024-01-01 07:00:00\n\n\
Blood Glucose: ??? mmol/L\n\
Log Entry Time: 2024-03-13 07:00:00\n\n\
Blood Glucose: n/a mmol/L\n\
Type: other\n",
        )
        .unwrap();

        let store = LogStore::new(&log_path);
        let results: Vec<_> = store
            .query_at(TimeFilter::Day, GlucoseUnit::MmolPerL, at(2024, 3, 13, 12, 0))
            .unwrap()
            .collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Parse { line: 6, .. })));
        assert_eq!(results[2].as_ref().unwrap(), "Type: other");
    }

    #[test]
    fn test_invalid_utf8_line_reported_and_scan_continues() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("logs.txt");
        let mut contents = b"Log Entry Time: 2024-03-13 07:00:00\n\n\
Blood Glucose: 5.00 mmol/L\n\
Type: oth\xFFer\n"
            .to_vec();
        contents.extend_from_slice(
            b"Log Entry Time: 2024-03-13 09:00:00\n\n\
Blood Glucose: 6.00 mmol/L\n\
Type: other\n",
        );
        std::fs::write(&log_path, contents).unwrap();

        let store = LogStore::new(&log_path);
        let results: Vec<_> = store
            .query_at(TimeFilter::Day, GlucoseUnit::MmolPerL, at(2024, 3, 13, 12, 0))
            .unwrap()
            .collect();

        let errors: Vec<_> = results.iter().filter(|r| r.is_err()).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Err(Error::Parse { line: 4, .. })));

        let lines: Vec<_> = results.into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(
            lines,
            vec![
                "Log Entry Time: 2024-03-13 07:00:00",
                "Blood Glucose Level: 5.00 mmol/L",
                "Log Entry Time: 2024-03-13 09:00:00",
                "Blood Glucose Level: 6.00 mmol/L",
                "Type: other",
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_outside_window_is_silent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("logs.txt");
        std::fs::write(
            &log_path,
            b"Log Entry Time: 2024-01-01 07:00:00\r\n\n\
Type: \xC3\x28\n\
Log Entry Time: 2024-03-13 07:00:00\r\n\n\
Type: other\r\n",
        )
        .unwrap();

        let store = LogStore::new(&log_path);
        let results: Vec<_> = store
            .query_at(TimeFilter::Day, GlucoseUnit::MmolPerL, at(2024, 3, 13, 12, 0))
            .unwrap()
            .collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "Log Entry Time: 2024-03-13 07:00:00");
        assert_eq!(results[1].as_ref().unwrap(), "Type: other");
    }

    #[test]
    fn test_query_missing_file_is_io_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(temp_dir.path().join("nope.txt"));

        assert!(matches!(
            store.query(TimeFilter::Day, GlucoseUnit::MmolPerL),
            Err(Error::Io(_))
        ));
    }
}
