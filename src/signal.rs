//! Platform signals in wire form
//!
//! Hosts that cannot call the logger directly (or that record a session for
//! later replay) encode each platform callback as one JSON object per line.

use serde::{Deserialize, Serialize};

use crate::error::LoggerError;
use crate::types::ContactId;

/// One platform callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// New ambient scalar reading
    Ambient { value: f32 },
    /// Contact began
    Begin { id: ContactId, ts: i64 },
    /// Explicit sample for one contact
    Sample { id: ContactId, value: f32 },
    /// Pointer movement; applies the latest ambient reading to all open contacts
    Move,
    /// Contact ended
    End { id: ContactId, ts: i64 },
    /// Platform aborted the contact
    Cancel { id: ContactId },
    /// Screen became interactive (`true`) or went dark (`false`)
    Interactive { on: bool },
    /// User submitted a label
    Label { text: String },
}

/// Parse newline-delimited signals, skipping blank lines.
///
/// Errors name the 1-based line that failed.
pub fn parse_ndjson(input: &str) -> Result<Vec<Signal>, LoggerError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| parse_line(line).map_err(|e| line_error(index + 1, e)))
        .collect()
}

/// Parse a single signal line
pub fn parse_line(line: &str) -> Result<Signal, LoggerError> {
    Ok(serde_json::from_str(line.trim())?)
}

fn line_error(line: usize, err: LoggerError) -> LoggerError {
    LoggerError::RecordParse(format!("signal on line {}: {}", line, err))
}
