//! Text helpers shared by the CLI renderers.

use std::io::{self, Write};

use chrono::DateTime;

use crate::constants::requests::TIMESTAMP_FORMAT;
use crate::types::EpochSeconds;

/// Split a comma-separated argument into trimmed, non-empty entries.
pub fn parse_csv_fields(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Quote a CSV field when it contains a delimiter, quote, or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write one CSV record terminated by `\n`.
pub fn write_csv_row<W, I, S>(out: &mut W, fields: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line = fields
        .into_iter()
        .map(|field| csv_field(field.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{line}")
}

/// Render epoch seconds in the shared timestamp layout (UTC).
pub fn format_epoch(seconds: EpochSeconds) -> String {
    DateTime::from_timestamp(seconds, 0)
        .map(|time| time.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| seconds.to_string())
}

/// Replace tabs and line breaks so a value fits one tab-separated column.
pub fn tsv_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}
