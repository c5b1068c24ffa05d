use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use cloak_engine::Identity;
use cloak_types::api::{AppealRequest, ReportRequest, ReportResponse, ReviewRequest};

use crate::error::{ApiError, run_blocking};
use crate::state::AppState;

pub async fn report_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let moderation = state.engine.moderation.clone();
    let outcome = run_blocking(move || moderation.report(Some(&identity), user_id, &req.reason)).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReportResponse {
            report_id: outcome.report_id,
            reported_user_suspended: outcome.reported_user_suspended,
        }),
    ))
}

/// Public: suspended accounts cannot hold a token, so the appeal carries
/// the credentials.
pub async fn submit_appeal(
    State(state): State<AppState>,
    Json(req): Json<AppealRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.engine.accounts.clone();
    let moderation = state.engine.moderation.clone();
    let appeal = run_blocking(move || {
        let (identity, _) = accounts.verify_credentials(&req.username, &req.password)?;
        moderation.submit_appeal(identity.user_id, &req.message)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(appeal)))
}

pub async fn list_appeals(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let moderation = state.engine.moderation.clone();
    let appeals = run_blocking(move || moderation.list_appeals(Some(&identity))).await?;
    Ok(Json(appeals))
}

pub async fn review_appeal(
    State(state): State<AppState>,
    Path(appeal_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let moderation = state.engine.moderation.clone();
    let appeal = run_blocking(move || moderation.review(Some(&identity), appeal_id, req.decision)).await?;
    Ok(Json(appeal))
}
