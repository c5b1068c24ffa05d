use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use cloak_engine::{ConsentGate, Identity, PendingFile};
use cloak_types::api::{ConfirmResponse, GateResponse};
use cloak_types::models::MessageTarget;

use crate::error::{ApiError, run_blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StageQuery {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

fn gate_response(gate: &ConsentGate) -> GateResponse {
    let staged = gate.staged();
    GateResponse {
        state: gate.state(),
        kind: staged.map(|(kind, _)| kind),
        size: staged.map(|(_, size)| size),
    }
}

/// The body is the raw file; its MIME type comes from `Content-Type`.
async fn stage(
    state: AppState,
    identity: Identity,
    target: MessageTarget,
    headers: HeaderMap,
    query: StageQuery,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let file = PendingFile {
        file_name: query.file_name.unwrap_or_else(|| "upload".to_string()),
        mime,
        bytes: body,
    };

    let store = state.engine.messages.clone();
    let actor = identity.clone();
    run_blocking(move || store.check_can_post(Some(&actor), target)).await?;

    let gates = &state.engine.gates;
    let handle = gates.gate(identity.user_id);
    let mut gate = handle.lock().await;
    let staged = gate.stage_attachment(target, file, query.caption);
    let response = gate_response(&gate);
    drop(gate);
    drop(handle);
    if staged.is_err() {
        gates.release(identity.user_id);
    }
    staged?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn stage_group_attachment(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<StageQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    stage(state, identity, MessageTarget::Group(group_id), headers, query, body).await
}

pub async fn stage_direct_attachment(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<StageQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    stage(
        state,
        identity,
        MessageTarget::Conversation(conversation_id),
        headers,
        query,
        body,
    )
    .await
}

pub async fn get_gate(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> impl IntoResponse {
    let gates = &state.engine.gates;
    let handle = gates.gate(identity.user_id);
    let response = gate_response(&*handle.lock().await);
    drop(handle);
    gates.release(identity.user_id);
    Json(response)
}

pub async fn request_confirmation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let gates = &state.engine.gates;
    let handle = gates.gate(identity.user_id);
    let mut gate = handle.lock().await;
    let requested = gate.request_confirmation();
    let response = gate_response(&gate);
    drop(gate);
    drop(handle);
    if requested.is_err() {
        gates.release(identity.user_id);
    }
    requested?;
    Ok(Json(response))
}

pub async fn confirm(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let gates = &state.engine.gates;
    let handle = gates.gate(identity.user_id);
    let mut gate = handle.lock().await;
    let message = gate.confirm(Some(&identity)).await;
    let gate_state = gate.state();
    drop(gate);
    drop(handle);
    gates.release(identity.user_id);

    Ok(Json(ConfirmResponse {
        state: gate_state,
        message: message?,
    }))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> impl IntoResponse {
    let gates = &state.engine.gates;
    let handle = gates.gate(identity.user_id);
    let mut gate = handle.lock().await;
    gate.cancel();
    let response = gate_response(&gate);
    drop(gate);
    drop(handle);
    gates.release(identity.user_id);
    Json(response)
}
