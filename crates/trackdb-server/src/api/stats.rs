use axum::{extract::State, Extension, Json};
use serde::Serialize;
use trackdb_db::{StoreStats, TrackingStore};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct CarriersData {
    supported: Vec<String>,
}

pub(super) async fn statistics(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<StoreStats>>, ApiError> {
    let stats = state
        .store
        .statistics()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(stats, req_id.0)))
}

pub(super) async fn list_carriers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<CarriersData>> {
    Json(ApiResponse::new(
        CarriersData {
            supported: state.registry.list_supported(),
        },
        req_id.0,
    ))
}
