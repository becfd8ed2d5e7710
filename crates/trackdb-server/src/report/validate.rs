//! Field-level validation of report requests.
//!
//! The request body is taken as loose JSON so every problem can be reported
//! against the field that caused it, rather than failing on the first serde
//! error.

use serde::Serialize;
use serde_json::Value;
use trackdb_carriers::registry::normalize_id;

use super::{CarrierIds, ReportFormat, ReportRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validates a raw report request body.
///
/// # Errors
///
/// Returns every [`FieldError`] found; the list is never empty on `Err`.
pub fn validate_report_request(body: &Value) -> Result<ReportRequest, Vec<FieldError>> {
    let mut errors = Vec::new();

    let format = match body.get("format") {
        None | Some(Value::Null) => {
            errors.push(FieldError::new("format", "is required"));
            None
        }
        Some(Value::String(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => {
                errors.push(FieldError::new(
                    "format",
                    format!("must be \"json\" or \"csv\", got \"{raw}\""),
                ));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new("format", "must be a string"));
            None
        }
    };

    let ids_by_carrier = match body.get("ids_by_carrier") {
        None | Some(Value::Null) => {
            errors.push(FieldError::new("ids_by_carrier", "is required"));
            Vec::new()
        }
        Some(Value::Array(entries)) if entries.is_empty() => {
            errors.push(FieldError::new("ids_by_carrier", "must not be empty"));
            Vec::new()
        }
        Some(Value::Array(entries)) => entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| validate_entry(index, entry, &mut errors))
            .collect(),
        Some(_) => {
            errors.push(FieldError::new("ids_by_carrier", "must be an array"));
            Vec::new()
        }
    };

    match format {
        Some(format) if errors.is_empty() => Ok(ReportRequest {
            format,
            ids_by_carrier,
        }),
        _ => Err(errors),
    }
}

fn validate_entry(index: usize, entry: &Value, errors: &mut Vec<FieldError>) -> Option<CarrierIds> {
    let field = format!("ids_by_carrier[{index}]");
    let Value::Object(entry) = entry else {
        errors.push(FieldError::new(field, "must be an object"));
        return None;
    };

    let carrier = match entry.get("carrier") {
        Some(Value::String(carrier)) if !carrier.trim().is_empty() => Some(normalize_id(carrier)),
        Some(Value::String(_)) => {
            errors.push(FieldError::new(format!("{field}.carrier"), "must not be blank"));
            None
        }
        None | Some(Value::Null) => {
            errors.push(FieldError::new(format!("{field}.carrier"), "is required"));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(format!("{field}.carrier"), "must be a string"));
            None
        }
    };

    let ids = match entry.get("ids") {
        Some(Value::Array(ids)) if ids.is_empty() => {
            errors.push(FieldError::new(format!("{field}.ids"), "must not be empty"));
            None
        }
        Some(Value::Array(ids)) => {
            let mut valid = Vec::with_capacity(ids.len());
            for (position, id) in ids.iter().enumerate() {
                match id.as_str().map(str::trim) {
                    Some(id) if !id.is_empty() => valid.push(id.to_string()),
                    _ => errors.push(FieldError::new(
                        format!("{field}.ids[{position}]"),
                        "must be a non-empty string",
                    )),
                }
            }
            (valid.len() == ids.len()).then_some(valid)
        }
        None | Some(Value::Null) => {
            errors.push(FieldError::new(format!("{field}.ids"), "is required"));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(format!("{field}.ids"), "must be an array"));
            None
        }
    };

    Some(CarrierIds {
        carrier: carrier?,
        ids: ids?,
    })
}
