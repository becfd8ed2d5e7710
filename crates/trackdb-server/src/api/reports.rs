use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::middleware::RequestId;
use crate::report::{build_report, render_csv, validate_report_request, FieldError, ReportFormat};

use super::{map_db_error, ApiError, ApiResponse, AppState};

fn invalid_report(request_id: String, fields: &[FieldError]) -> ApiError {
    ApiError::new(request_id, "validation_error", "invalid report request")
        .with_details(json!({ "fields": fields }))
}

/// Builds a report from stored records. JSON reports use the standard
/// envelope; CSV reports are returned as a `text/csv` body.
pub(super) async fn create_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: Value = serde_json::from_slice(&body).map_err(|e| {
        invalid_report(
            req_id.0.clone(),
            &[FieldError {
                field: "body".to_string(),
                message: format!("must be a JSON object: {e}"),
            }],
        )
    })?;

    let request =
        validate_report_request(&body).map_err(|fields| invalid_report(req_id.0.clone(), &fields))?;

    let rows = build_report(state.store.as_ref(), &request)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(
        rows = rows.len(),
        format = ?request.format,
        "report: generated"
    );

    Ok(match request.format {
        ReportFormat::Json => Json(ApiResponse::new(rows, req_id.0)).into_response(),
        ReportFormat::Csv => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"tracking-report.csv\"",
                ),
            ],
            render_csv(&rows),
        )
            .into_response(),
    })
}
