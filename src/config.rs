use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::constants::activity::{ALL_TIME_END, ALL_TIME_START};
use crate::constants::attribution::DEFAULT_TABLE;
use crate::constants::requests::{DEFAULT_BUFFER_SIZE, TIMESTAMP_FORMAT};
use crate::errors::AnalyticsError;
use crate::types::TableName;

/// Half-open (or closed, with `end_inclusive`) time window.
///
/// `start` is always inclusive. Bounds are compared against textual
/// timestamp columns, so they are rendered with the shared timestamp layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    /// Inclusive lower bound.
    pub start: NaiveDateTime,
    /// Upper bound.
    pub end: NaiveDateTime,
    /// Compare `end` with `<=` instead of `<`.
    pub end_inclusive: bool,
}

impl DateRange {
    /// Range starting at midnight of `start` and ending at midnight of `end`.
    pub fn from_dates(start: NaiveDate, end: NaiveDate, end_inclusive: bool) -> Self {
        Self {
            start: start.and_time(NaiveTime::MIN),
            end: end.and_time(NaiveTime::MIN),
            end_inclusive,
        }
    }

    /// Sentinel range covering every practical timestamp.
    pub fn all_time() -> Self {
        Self {
            start: parse_sentinel(ALL_TIME_START),
            end: parse_sentinel(ALL_TIME_END),
            end_inclusive: true,
        }
    }

    /// Lower bound rendered for SQL comparison.
    pub fn start_sql(&self) -> String {
        self.start.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Upper bound rendered for SQL comparison.
    pub fn end_sql(&self) -> String {
        self.end.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Comparison operator applied to the upper bound.
    pub fn end_operator(&self) -> &'static str {
        if self.end_inclusive { "<=" } else { "<" }
    }

    /// Whether `value` falls inside the range.
    pub fn contains(&self, value: &NaiveDateTime) -> bool {
        let below_end = if self.end_inclusive {
            *value <= self.end
        } else {
            *value < self.end
        };
        *value >= self.start && below_end
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::all_time()
    }
}

fn parse_sentinel(value: &str) -> NaiveDateTime {
    // Both sentinels are compile-time constants in the shared layout.
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).unwrap_or_default()
}

/// A named reporting phase.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Phase {
    /// Label written to the phase column.
    pub name: String,
    /// First day of the phase.
    #[serde(rename = "startdate", alias = "start_date")]
    pub start_date: NaiveDate,
    /// Day after the phase ends (exclusive unless the range is inclusive).
    #[serde(rename = "enddate", alias = "end_date")]
    pub end_date: NaiveDate,
}

/// Run settings loaded from the JSON configuration file.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    /// Connection descriptor, `sqlite:<path>` or a bare path.
    pub dsn: String,
    /// Default range start (inclusive); all-time when absent.
    #[serde(default, rename = "startdate", alias = "start_date")]
    pub start_date: Option<NaiveDate>,
    /// Default range end; all-time when absent.
    #[serde(default, rename = "enddate", alias = "end_date")]
    pub end_date: Option<NaiveDate>,
    /// Treat `enddate` (and phase end dates) as inclusive.
    #[serde(default)]
    pub end_inclusive: bool,
    /// Named phases for segmented reports.
    #[serde(default)]
    pub phases: Vec<Phase>,
    /// Capacity of the bounded queue behind every row stream.
    #[serde(default = "default_buffer_size")]
    pub request_buffer_size: usize,
    /// Extra user-agent substrings excluded on top of the built-in deny-list.
    #[serde(default)]
    pub user_agent_denylist: Vec<String>,
    /// Name of the derived request→user table.
    #[serde(default = "default_attribution_table")]
    pub attribution_table: TableName,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_attribution_table() -> TableName {
    DEFAULT_TABLE.to_string()
}

impl Settings {
    /// Settings pointing at `dsn` with every other field defaulted.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            start_date: None,
            end_date: None,
            end_inclusive: false,
            phases: Vec::new(),
            request_buffer_size: DEFAULT_BUFFER_SIZE,
            user_agent_denylist: Vec::new(),
            attribution_table: default_attribution_table(),
        }
    }

    /// Read and parse a JSON settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AnalyticsError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json(&raw).map_err(|err| match err {
            AnalyticsError::Configuration(reason) => {
                AnalyticsError::Configuration(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    /// Parse settings from a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, AnalyticsError> {
        let settings: Settings = serde_json::from_str(raw)
            .map_err(|err| AnalyticsError::Configuration(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), AnalyticsError> {
        if self.dsn.trim().is_empty() {
            return Err(AnalyticsError::Configuration("dsn must not be empty".into()));
        }
        if self.request_buffer_size == 0 {
            return Err(AnalyticsError::Configuration(
                "request_buffer_size must be greater than zero".into(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AnalyticsError::Configuration(format!(
                    "startdate {start} is after enddate {end}"
                )));
            }
        }
        for phase in &self.phases {
            if phase.start_date > phase.end_date {
                return Err(AnalyticsError::Configuration(format!(
                    "phase '{}' starts after it ends",
                    phase.name
                )));
            }
        }
        Ok(())
    }

    /// Default reporting range; a missing bound falls back to the all-time sentinel.
    pub fn date_range(&self) -> DateRange {
        let all_time = DateRange::all_time();
        DateRange {
            start: self
                .start_date
                .map(|date| date.and_time(NaiveTime::MIN))
                .unwrap_or(all_time.start),
            end: self
                .end_date
                .map(|date| date.and_time(NaiveTime::MIN))
                .unwrap_or(all_time.end),
            end_inclusive: self.end_date.is_none() || self.end_inclusive,
        }
    }

    /// Range of a configured phase, honoring `end_inclusive`.
    pub fn phase_range(&self, phase: &Phase) -> DateRange {
        DateRange::from_dates(phase.start_date, phase.end_date, self.end_inclusive)
    }
}
