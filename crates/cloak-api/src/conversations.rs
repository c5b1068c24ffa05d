use axum::{Extension, Json, extract::State, response::IntoResponse};

use cloak_engine::Identity;
use cloak_types::api::{ResolveConversationRequest, ResolveConversationResponse};

use crate::error::{ApiError, run_blocking};
use crate::state::AppState;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let resolver = state.engine.resolver.clone();
    let conversations = run_blocking(move || resolver.list_conversations(Some(&identity))).await?;
    Ok(Json(conversations))
}

pub async fn resolve_conversation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ResolveConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resolver = state.engine.resolver.clone();
    let conversation_id =
        run_blocking(move || resolver.resolve_or_create(Some(&identity), req.user_id)).await?;
    Ok(Json(ResolveConversationResponse { conversation_id }))
}
