//! JSON and CSV rendering of report rows.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};

use super::ReportRow;

pub const CSV_HEADER: [&str; 14] = [
    "carrier",
    "tracking_number",
    "status",
    "message",
    "shipment_status",
    "is_delivered",
    "package_id",
    "package_status",
    "package_status_description",
    "last_event_time",
    "last_event_code",
    "last_event_description",
    "last_event_location",
    "last_updated",
];

/// # Errors
///
/// Returns [`serde_json::Error`] if serialization fails.
pub fn render_json(rows: &[ReportRow]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(rows)
}

/// Renders rows as CSV with a header line and CRLF line endings.
#[must_use]
pub fn render_csv(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    push_record(&mut out, CSV_HEADER.iter().copied());
    for row in rows {
        let last_event_time = timestamp(row.last_event_time);
        let last_updated = timestamp(row.last_updated);
        push_record(
            &mut out,
            [
                row.carrier.as_str(),
                row.tracking_number.as_str(),
                row.status.as_str(),
                row.message.as_str(),
                row.shipment_status.as_str(),
                if row.is_delivered { "true" } else { "false" },
                row.package_id.as_str(),
                row.package_status.as_str(),
                row.package_status_description.as_str(),
                last_event_time.as_str(),
                row.last_event_code.as_str(),
                row.last_event_description.as_str(),
                row.last_event_location.as_str(),
                last_updated.as_str(),
            ],
        );
    }
    out
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (index, field) in fields.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str("\r\n");
}

/// Quotes a field when it contains a delimiter, quote, CR or LF; embedded
/// quotes are doubled.
fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
    } else {
        out.push_str(field);
    }
}
