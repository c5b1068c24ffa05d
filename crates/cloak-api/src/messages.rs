use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use cloak_engine::Identity;
use cloak_types::api::{DeleteMessagesResponse, SendMessageRequest};
use cloak_types::models::MessageTarget;

use crate::error::{ApiError, run_blocking};
use crate::state::AppState;

async fn list(state: AppState, identity: Identity, target: MessageTarget) -> Result<impl IntoResponse, ApiError> {
    let store = state.engine.messages.clone();
    let messages = run_blocking(move || store.list(Some(&identity), target)).await?;
    Ok(Json(messages))
}

async fn send(
    state: AppState,
    identity: Identity,
    target: MessageTarget,
    content: String,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.engine.messages.clone();
    let message = run_blocking(move || store.append(Some(&identity), target, &content, None)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_group_messages(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    list(state, identity, MessageTarget::Group(group_id)).await
}

pub async fn send_group_message(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    send(state, identity, MessageTarget::Group(group_id), req.content).await
}

pub async fn get_direct_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    list(state, identity, MessageTarget::Conversation(conversation_id)).await
}

pub async fn send_direct_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    send(state, identity, MessageTarget::Conversation(conversation_id), req.content).await
}

/// Retract every live message the caller sent in a conversation.
pub async fn retract_direct_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.engine.messages.clone();
    let deleted = run_blocking(move || store.soft_delete(Some(&identity), conversation_id)).await?;
    Ok(Json(DeleteMessagesResponse { deleted }))
}
