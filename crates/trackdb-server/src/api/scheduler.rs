use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Serialize;

use crate::middleware::RequestId;
use crate::scheduler::SchedulerStatus;

use super::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct TriggerData {
    accepted: bool,
    /// `true` when a pass was already running, so the trigger will be a no-op.
    pass_in_progress: bool,
}

pub(super) async fn scheduler_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<SchedulerStatus>> {
    Json(ApiResponse::new(state.scheduler.status(), req_id.0))
}

pub(super) async fn trigger_pass(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> (StatusCode, Json<ApiResponse<TriggerData>>) {
    let pass_in_progress = state.scheduler.status().pass_in_progress;
    state.scheduler.trigger();
    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(
            TriggerData {
                accepted: true,
                pass_in_progress,
            },
            req_id.0,
        )),
    )
}
