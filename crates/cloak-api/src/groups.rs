use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use cloak_engine::{CloakError, Identity};
use cloak_types::api::MembershipResponse;

use crate::error::{ApiError, run_blocking};
use crate::state::AppState;

pub async fn list_groups(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let directory = state.engine.directory.clone();
    let groups = run_blocking(move || directory.list_groups()).await?;
    Ok(Json(groups))
}

pub async fn my_groups(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let directory = state.engine.directory.clone();
    let groups = run_blocking(move || directory.my_groups(Some(&identity))).await?;
    Ok(Json(groups))
}

/// Joining twice is reported as membership rather than an error.
pub async fn join_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let directory = state.engine.directory.clone();
    match run_blocking(move || directory.join(Some(&identity), group_id)).await {
        Ok(()) | Err(ApiError(CloakError::AlreadyMember)) => {}
        Err(e) => return Err(e),
    }
    Ok(Json(MembershipResponse {
        group_id,
        member: true,
    }))
}

pub async fn leave_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let directory = state.engine.directory.clone();
    run_blocking(move || directory.leave(Some(&identity), group_id)).await?;
    Ok(Json(MembershipResponse {
        group_id,
        member: false,
    }))
}
