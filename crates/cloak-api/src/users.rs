use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use cloak_engine::Identity;

use crate::error::{ApiError, run_blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search_users(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let social = state.engine.social.clone();
    let users = run_blocking(move || social.search_users(Some(&identity), &query.q)).await?;
    Ok(Json(users))
}

pub async fn block_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let social = state.engine.social.clone();
    run_blocking(move || social.block(Some(&identity), user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unblock_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let social = state.engine.social.clone();
    run_blocking(move || social.unblock(Some(&identity), user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_blocked(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let social = state.engine.social.clone();
    let blocked = run_blocking(move || social.list_blocked(Some(&identity))).await?;
    Ok(Json(blocked))
}
