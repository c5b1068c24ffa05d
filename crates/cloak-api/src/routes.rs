use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::state::AppState;
use crate::{
    attachments, auth, conversations, groups, messages, middleware::require_auth, moderation,
    statuses, users,
};

/// Raw attachment bodies; the gate enforces the real per-file limit.
const ATTACHMENT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// The REST surface. The `/gateway` WebSocket is mounted by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/appeal", post(moderation::submit_appeal));

    let attachment_routes = Router::new()
        .route(
            "/groups/{group_id}/attachments",
            post(attachments::stage_group_attachment),
        )
        .route(
            "/conversations/{conversation_id}/attachments",
            post(attachments::stage_direct_attachment),
        )
        .layer(DefaultBodyLimit::max(ATTACHMENT_BODY_LIMIT));

    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route("/groups", get(groups::list_groups))
        .route("/groups/mine", get(groups::my_groups))
        .route(
            "/groups/{group_id}/members",
            post(groups::join_group).delete(groups::leave_group),
        )
        .route(
            "/groups/{group_id}/messages",
            get(messages::get_group_messages).post(messages::send_group_message),
        )
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::resolve_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_direct_messages)
                .post(messages::send_direct_message)
                .delete(messages::retract_direct_messages),
        )
        .route(
            "/attachments",
            get(attachments::get_gate).delete(attachments::cancel),
        )
        .route(
            "/attachments/confirmation",
            post(attachments::request_confirmation),
        )
        .route("/attachments/confirm", post(attachments::confirm))
        .route(
            "/statuses",
            get(statuses::list_statuses).post(statuses::post_status),
        )
        .route("/users/search", get(users::search_users))
        .route(
            "/users/{user_id}/block",
            post(users::block_user).delete(users::unblock_user),
        )
        .route("/blocks", get(users::list_blocked))
        .route("/users/{user_id}/reports", post(moderation::report_user))
        .route("/appeals", get(moderation::list_appeals))
        .route("/appeals/{appeal_id}/review", post(moderation::review_appeal))
        .merge(attachment_routes)
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let blobs = ServeDir::new(state.engine.blobs.dir());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/blobs", blobs)
        .with_state(state)
}

