use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use cloak_engine::Identity;
use cloak_types::api::PostStatusRequest;

use crate::error::{ApiError, run_blocking};
use crate::state::AppState;

pub async fn list_statuses(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = state.engine.statuses.clone();
    let statuses = run_blocking(move || ledger.list_active(Some(&identity))).await?;
    Ok(Json(statuses))
}

pub async fn post_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PostStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = state.engine.statuses.clone();
    let status = run_blocking(move || ledger.post(Some(&identity), &req.content)).await?;
    Ok((StatusCode::CREATED, Json(status)))
}
