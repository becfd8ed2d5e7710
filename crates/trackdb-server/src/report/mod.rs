//! Report aggregation over stored tracking records.
//!
//! Reports read the tracking store only; they never call a carrier. Each
//! requested id becomes one row per stored package, or a single row when the
//! id is unknown, failed, or has no packages.

mod render;
mod validate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trackdb_core::{CanonicalPackage, ResponseStatus};
use trackdb_db::{DbError, TrackedRecord, TrackingStore};

pub use render::{render_csv, render_json, CSV_HEADER};
pub use validate::{validate_report_request, FieldError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierIds {
    pub carrier: String,
    pub ids: Vec<String>,
}

/// A validated report request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub format: ReportFormat,
    pub ids_by_carrier: Vec<CarrierIds>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    Success,
    Error,
    NotFound,
}

impl RowStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::NotFound => "NOT_FOUND",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub carrier: String,
    pub tracking_number: String,
    pub status: RowStatus,
    /// Stored error for `ERROR` rows, response description otherwise.
    pub message: String,
    pub shipment_status: String,
    pub is_delivered: bool,
    pub package_id: String,
    pub package_status: String,
    pub package_status_description: String,
    pub last_event_time: Option<DateTime<Utc>>,
    pub last_event_code: String,
    pub last_event_description: String,
    pub last_event_location: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ReportRow {
    fn not_found(carrier: &str, tracking_number: &str) -> Self {
        Self {
            carrier: carrier.to_string(),
            tracking_number: tracking_number.to_string(),
            status: RowStatus::NotFound,
            message: "no stored record for this tracking number".to_string(),
            shipment_status: String::new(),
            is_delivered: false,
            package_id: String::new(),
            package_status: String::new(),
            package_status_description: String::new(),
            last_event_time: None,
            last_event_code: String::new(),
            last_event_description: String::new(),
            last_event_location: String::new(),
            last_updated: None,
        }
    }
}

/// Classification of one stored record.
fn classify(record: &TrackedRecord) -> (RowStatus, String) {
    let response = &record.last_response;
    if let Some(error) = record.last_error.as_deref().filter(|e| !e.is_empty()) {
        return (RowStatus::Error, error.to_string());
    }
    match response.status {
        ResponseStatus::Error => (RowStatus::Error, response.error_summary()),
        ResponseStatus::NotFound => (RowStatus::NotFound, response.description.clone()),
        ResponseStatus::Success => (RowStatus::Success, response.description.clone()),
    }
}

fn rows_for_record(record: &TrackedRecord) -> Vec<ReportRow> {
    let (status, message) = classify(record);
    let shipment = &record.last_response.shipment;

    let base = ReportRow {
        status,
        message,
        shipment_status: shipment.status_description.clone(),
        is_delivered: record.is_delivered,
        last_updated: Some(record.last_updated),
        ..ReportRow::not_found(&record.carrier, &record.tracking_number)
    };

    if shipment.packages.is_empty() {
        return vec![base];
    }

    shipment
        .packages
        .iter()
        .map(|package| with_package(base.clone(), package))
        .collect()
}

fn with_package(mut row: ReportRow, package: &CanonicalPackage) -> ReportRow {
    let event = &package.most_recent_event;
    row.package_id = package.id.clone().unwrap_or_default();
    row.package_status = package.status_code.clone();
    row.package_status_description = package.status_description.clone();
    row.last_event_time =
        (event.timestamp != DateTime::<Utc>::default()).then_some(event.timestamp);
    row.last_event_code = event.code.clone();
    row.last_event_description = event.description.clone();
    row.last_event_location = [
        event.location.city.as_str(),
        event.location.region.as_str(),
        event.location.country_code.as_str(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ");
    row
}

/// Builds report rows in request order.
///
/// Unknown ids become `NOT_FOUND` rows; the batch never stops on them.
///
/// # Errors
///
/// Returns [`DbError`] if the store cannot be read.
pub async fn build_report(
    store: &dyn TrackingStore,
    request: &ReportRequest,
) -> Result<Vec<ReportRow>, DbError> {
    let mut rows = Vec::new();
    for entry in &request.ids_by_carrier {
        for tracking_number in &entry.ids {
            match store.get(tracking_number, &entry.carrier).await? {
                Some(record) => rows.extend(rows_for_record(&record)),
                None => {
                    tracing::debug!(
                        carrier = %entry.carrier,
                        tracking_number = %tracking_number,
                        "report: no stored record"
                    );
                    rows.push(ReportRow::not_found(&entry.carrier, tracking_number));
                }
            }
        }
    }
    Ok(rows)
}
