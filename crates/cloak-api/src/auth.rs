use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use cloak_engine::{CloakError, Identity, SessionContext, moderation::can_review};
use cloak_types::api::{LoginRequest, LoginResponse, MeResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, run_blocking};
use crate::middleware::create_token;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.engine.accounts.clone();
    let identity = run_blocking(move || accounts.register(&req.username, &req.password)).await?;

    let token = create_token(&state.jwt_secret, identity.user_id, &identity.handle)
        .map_err(CloakError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: identity.user_id,
            token,
        }),
    ))
}

/// Each request is its own session; a suspended account is signed in and
/// revoked straight away, so the caller only ever sees the refusal.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.engine.accounts.clone();
    let identity = run_blocking(move || {
        let session = SessionContext::new();
        accounts.sign_in(&session, &req.username, &req.password)
    })
    .await?;

    let token = create_token(&state.jwt_secret, identity.user_id, &identity.handle)
        .map_err(CloakError::from)?;

    Ok(Json(LoginResponse {
        user_id: identity.user_id,
        username: identity.handle,
        token,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let moderation = state.engine.moderation.clone();
    let user_id = identity.user_id;
    let (roles, account_state) = run_blocking(move || {
        Ok((moderation.roles(user_id)?, moderation.account_state(user_id)?))
    })
    .await?;

    Ok(Json(MeResponse {
        user_id,
        username: identity.handle,
        can_review: can_review(&roles),
        roles,
        state: account_state,
    }))
}
