//! Track-and-store, quick-track, status and stop-tracking handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use trackdb_carriers::{registry::normalize_id, CarrierAdapter, CarrierError};
use trackdb_core::{CanonicalResponse, TrackOptions};
use trackdb_db::TrackedRecord;

use crate::middleware::RequestId;
use crate::tracking::{lookup, track_and_store, CarrierFailure, TrackError};

use super::{map_db_error, ApiError, ApiResponse, AppState};

const MAX_TRACKING_NUMBER_LEN: usize = 64;

#[derive(Debug, Default, Deserialize)]
pub(super) struct TrackQuery {
    date_from: Option<String>,
    date_to: Option<String>,
    proof_of_delivery: Option<String>,
    include_detailed_view: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct UntrackData {
    removed: bool,
}

fn validation_error(request_id: &str, field: &str, message: impl Into<String>) -> ApiError {
    let message = message.into();
    ApiError::new(request_id, "validation_error", format!("{field} {message}"))
        .with_details(json!({ "fields": [{ "field": field, "message": message }] }))
}

fn parse_date(
    request_id: &str,
    field: &str,
    value: Option<&str>,
) -> Result<Option<NaiveDate>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                validation_error(request_id, field, "must be a date in YYYY-MM-DD form")
            }),
    }
}

fn parse_flag(request_id: &str, field: &str, value: Option<&str>) -> Result<bool, ApiError> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("" | "false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(_) => Err(validation_error(request_id, field, "must be true or false")),
    }
}

pub(super) fn parse_options(
    request_id: &str,
    query: &TrackQuery,
) -> Result<TrackOptions, ApiError> {
    let options = TrackOptions {
        date_from: parse_date(request_id, "date_from", query.date_from.as_deref())?,
        date_to: parse_date(request_id, "date_to", query.date_to.as_deref())?,
        proof_of_delivery: parse_flag(
            request_id,
            "proof_of_delivery",
            query.proof_of_delivery.as_deref(),
        )?,
        include_detailed_view: parse_flag(
            request_id,
            "include_detailed_view",
            query.include_detailed_view.as_deref(),
        )?,
    };

    options
        .check_date_range()
        .map_err(|e| validation_error(request_id, e.field(), e.reason()))?;
    Ok(options)
}

fn validate_tracking_number(
    request_id: &str,
    tracking_number: &str,
) -> Result<String, ApiError> {
    let trimmed = tracking_number.trim();
    if trimmed.is_empty() {
        return Err(validation_error(request_id, "tracking_number", "is required"));
    }
    if trimmed.len() > MAX_TRACKING_NUMBER_LEN {
        return Err(validation_error(
            request_id,
            "tracking_number",
            format!("must be at most {MAX_TRACKING_NUMBER_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn resolve_adapter(
    state: &AppState,
    request_id: &str,
    carrier: &str,
) -> Result<Arc<dyn CarrierAdapter>, ApiError> {
    state.registry.resolve(carrier).map_err(|e| match &e {
        CarrierError::NotSupported {
            requested,
            supported,
        } => ApiError::new(request_id, "validation_error", e.to_string())
            .with_details(json!({ "requested": requested, "supported": supported })),
        _ => ApiError::new(request_id, "validation_error", e.to_string()),
    })
}

fn track_error(request_id: String, err: &TrackError) -> ApiError {
    match err {
        TrackError::Invalid(e) => ApiError::new(request_id, "validation_error", e.to_string()),
        TrackError::Carrier(failure) => carrier_failure(&request_id, failure),
        TrackError::Store(e) => map_db_error(request_id, e),
    }
}

fn carrier_failure(request_id: &str, failure: &CarrierFailure) -> ApiError {
    let description = failure.response.description.as_str();
    ApiError::new(request_id, "carrier_error", description).with_details(
        json!({ "description": description, "errors": failure.response.errors }),
    )
}

pub(super) async fn track(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((carrier, tracking_number)): Path<(String, String)>,
    Query(query): Query<TrackQuery>,
) -> Result<(StatusCode, Json<ApiResponse<TrackedRecord>>), ApiError> {
    let adapter = resolve_adapter(&state, &req_id.0, &carrier)?;
    let tracking_number = validate_tracking_number(&req_id.0, &tracking_number)?;
    let options = parse_options(&req_id.0, &query)?;
    let carrier = normalize_id(&carrier);

    match track_and_store(
        state.store.as_ref(),
        adapter.as_ref(),
        &carrier,
        &tracking_number,
        options,
    )
    .await
    {
        Ok(record) => Ok((
            StatusCode::CREATED,
            Json(ApiResponse::new(record, req_id.0)),
        )),
        Err(e) => Err(track_error(req_id.0, &e)),
    }
}

pub(super) async fn query(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((carrier, tracking_number)): Path<(String, String)>,
    Query(query): Query<TrackQuery>,
) -> Result<Json<ApiResponse<CanonicalResponse>>, ApiError> {
    let adapter = resolve_adapter(&state, &req_id.0, &carrier)?;
    let tracking_number = validate_tracking_number(&req_id.0, &tracking_number)?;
    let options = parse_options(&req_id.0, &query)?;

    match lookup(adapter.as_ref(), &tracking_number, options).await {
        Ok(response) => Ok(Json(ApiResponse::new(response, req_id.0))),
        Err(e) => {
            tracing::warn!(
                carrier = %adapter.carrier(),
                tracking_number = %tracking_number,
                error = %e,
                "query: carrier lookup failed"
            );
            Err(track_error(req_id.0, &e))
        }
    }
}

fn record_not_found(request_id: String, carrier: &str, tracking_number: &str) -> ApiError {
    ApiError::new(
        request_id,
        "not_found",
        format!("no tracked record for {carrier} {tracking_number}"),
    )
}

pub(super) async fn status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((carrier, tracking_number)): Path<(String, String)>,
) -> Result<Json<ApiResponse<TrackedRecord>>, ApiError> {
    let carrier = normalize_id(&carrier);
    let tracking_number = validate_tracking_number(&req_id.0, &tracking_number)?;

    let record = state
        .store
        .get(&tracking_number, &carrier)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| record_not_found(req_id.0.clone(), &carrier, &tracking_number))?;

    Ok(Json(ApiResponse::new(record, req_id.0)))
}

pub(super) async fn untrack(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((carrier, tracking_number)): Path<(String, String)>,
) -> Result<Json<ApiResponse<UntrackData>>, ApiError> {
    let carrier = normalize_id(&carrier);
    let tracking_number = validate_tracking_number(&req_id.0, &tracking_number)?;

    let removed = state
        .store
        .delete(&tracking_number, &carrier)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if removed {
        tracing::info!(
            carrier = %carrier,
            tracking_number = %tracking_number,
            "untrack: record removed"
        );
    }
    Ok(Json(ApiResponse::new(UntrackData { removed }, req_id.0)))
}

pub(super) async fn deactivate(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((carrier, tracking_number)): Path<(String, String)>,
) -> Result<Json<ApiResponse<TrackedRecord>>, ApiError> {
    let carrier = normalize_id(&carrier);
    let tracking_number = validate_tracking_number(&req_id.0, &tracking_number)?;

    let record = state
        .store
        .deactivate(&tracking_number, &carrier)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| record_not_found(req_id.0.clone(), &carrier, &tracking_number))?;

    Ok(Json(ApiResponse::new(record, req_id.0)))
}

pub(super) async fn reactivate(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((carrier, tracking_number)): Path<(String, String)>,
) -> Result<Json<ApiResponse<TrackedRecord>>, ApiError> {
    let carrier = normalize_id(&carrier);
    let tracking_number = validate_tracking_number(&req_id.0, &tracking_number)?;

    let record = state
        .store
        .reactivate(&tracking_number, &carrier)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| record_not_found(req_id.0.clone(), &carrier, &tracking_number))?;

    Ok(Json(ApiResponse::new(record, req_id.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_parse_dates_and_flags() {
        let query = TrackQuery {
            date_from: Some("2024-11-01".to_string()),
            date_to: Some("2024-11-30".to_string()),
            proof_of_delivery: Some("TRUE".to_string()),
            include_detailed_view: None,
        };
        let options = parse_options("req", &query).unwrap();
        assert_eq!(options.date_from, NaiveDate::from_ymd_opt(2024, 11, 1));
        assert_eq!(options.date_to, NaiveDate::from_ymd_opt(2024, 11, 30));
        assert!(options.proof_of_delivery);
        assert!(!options.include_detailed_view);
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let query = TrackQuery {
            date_from: Some("2024-12-01".to_string()),
            date_to: Some("2024-11-01".to_string()),
            ..TrackQuery::default()
        };
        let err = parse_options("req", &query).unwrap_err();
        assert_eq!(err.error.code, "validation_error");
    }

    #[test]
    fn half_open_date_range_is_rejected() {
        let query = TrackQuery {
            date_from: Some("2024-11-01".to_string()),
            ..TrackQuery::default()
        };
        let err = parse_options("req", &query).unwrap_err();
        assert_eq!(err.error.code, "validation_error");
        assert_eq!(err.error.message, "date_from requires date_to");

        let query = TrackQuery {
            date_to: Some("2024-11-30".to_string()),
            ..TrackQuery::default()
        };
        let err = parse_options("req", &query).unwrap_err();
        let details = err.error.details.unwrap();
        assert_eq!(details["fields"][0]["field"], "date_to");
    }

    #[test]
    fn malformed_flag_names_the_field() {
        let query = TrackQuery {
            include_detailed_view: Some("maybe".to_string()),
            ..TrackQuery::default()
        };
        let err = parse_options("req", &query).unwrap_err();
        assert!(err.error.message.starts_with("include_detailed_view"));
        let details = err.error.details.unwrap();
        assert_eq!(details["fields"][0]["field"], "include_detailed_view");
    }

    #[test]
    fn tracking_number_is_trimmed_and_bounded() {
        assert_eq!(validate_tracking_number("req", " 1Z1 ").unwrap(), "1Z1");
        assert!(validate_tracking_number("req", "   ").is_err());
        assert!(validate_tracking_number("req", &"9".repeat(65)).is_err());
    }
}
