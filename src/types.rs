//! Core data types
//!
//! This module defines the completed tap event and its on-disk CSV record form.
//! Records are written as plain comma-joined fields with no quoting or escaping,
//! so labels containing a comma or newline produce records that do not parse
//! back into the same fields.

use crate::error::LoggerError;
use serde::{Deserialize, Serialize};

/// Transient pointer identifier, reused across contacts
pub type ContactId = i32;

/// Header line written once at the top of every log and backup file
pub const CSV_HEADER: &str = "StartTimestamp,Duration(ms),PeakPressure,CustomText";

/// Number of fields in a record
const RECORD_FIELDS: usize = 4;

/// A completed contact with its timing and peak ambient reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapEvent {
    /// Wall-clock milliseconds at contact begin
    pub start_timestamp: i64,
    /// Contact duration in milliseconds
    pub duration: i64,
    /// Highest ambient scalar sampled while the contact was open
    pub peak_scalar: f32,
    /// User-supplied note; empty means unlabeled
    #[serde(default)]
    pub label: String,
}

impl TapEvent {
    /// Create an unlabeled event
    pub fn new(start_timestamp: i64, duration: i64, peak_scalar: f32) -> Self {
        Self {
            start_timestamp,
            duration,
            peak_scalar,
            label: String::new(),
        }
    }

    /// Whether the event still awaits a label
    pub fn is_unlabeled(&self) -> bool {
        self.label.is_empty()
    }

    /// Set the label if the event has none yet.
    ///
    /// Returns true when the label was applied. An empty `text` never
    /// overwrites anything.
    pub fn apply_label(&mut self, text: &str) -> bool {
        if text.is_empty() || !self.is_unlabeled() {
            return false;
        }
        self.label = text.to_string();
        true
    }

    /// Render the event as one CSV record, without the trailing newline
    pub fn to_csv_record(&self) -> String {
        format!(
            "{},{},{},{}",
            self.start_timestamp,
            self.duration,
            format_scalar(self.peak_scalar),
            self.label
        )
    }

    /// Parse one CSV record written by [`TapEvent::to_csv_record`].
    ///
    /// The label is everything after the third comma.
    pub fn from_csv_record(line: &str) -> Result<Self, LoggerError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.splitn(RECORD_FIELDS, ',').collect();
        if fields.len() != RECORD_FIELDS {
            return Err(LoggerError::RecordParse(format!(
                "expected {} fields, found {}",
                RECORD_FIELDS,
                fields.len()
            )));
        }

        let start_timestamp = fields[0]
            .parse::<i64>()
            .map_err(|e| field_error("start timestamp", e))?;
        let duration = fields[1]
            .parse::<i64>()
            .map_err(|e| field_error("duration", e))?;
        let peak_scalar = fields[2]
            .parse::<f32>()
            .map_err(|e| field_error("peak scalar", e))?;

        Ok(Self {
            start_timestamp,
            duration,
            peak_scalar,
            label: fields[3].to_string(),
        })
    }
}

fn field_error(field: &str, err: impl std::fmt::Display) -> LoggerError {
    LoggerError::RecordParse(format!("invalid {}: {}", field, err))
}

/// Format a scalar with at least one fractional digit (`9` becomes `9.0`)
pub fn format_scalar(value: f32) -> String {
    // Debug formatting keeps the shortest round-trip digits and always
    // includes a fractional part for finite integral values.
    format!("{:?}", value)
}

/// Parse the records of a log file's contents, skipping the header line
pub fn parse_log_contents(contents: &str) -> Result<Vec<TapEvent>, LoggerError> {
    contents
        .lines()
        .filter(|line| !line.is_empty() && *line != CSV_HEADER)
        .map(TapEvent::from_csv_record)
        .collect()
}
