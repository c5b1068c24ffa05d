use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountState, AppealDecision, MediaKind, Message, Role};

// -- JWT Claims --

/// JWT claims shared across cloak-api (REST middleware) and cloak-gateway
/// (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

/// Appeal intake for a suspended account. Suspended users cannot sign in,
/// so the credentials travel with the appeal.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppealRequest {
    pub username: String,
    pub password: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<Role>,
    pub state: AccountState,
    pub can_review: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteMessagesResponse {
    pub deleted: usize,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveConversationRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveConversationResponse {
    pub conversation_id: Uuid,
}

// -- Groups --

#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipResponse {
    pub group_id: Uuid,
    pub member: bool,
}

// -- Attachments --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    AttachmentChosen,
    AwaitingTrustConfirmation,
    Uploading,
    Sent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GateResponse {
    pub state: GateState,
    pub kind: Option<MediaKind>,
    pub size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub state: GateState,
    pub message: Option<Message>,
}

// -- Statuses --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostStatusRequest {
    pub content: String,
}

// -- Moderation --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub report_id: Uuid,
    pub reported_user_suspended: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewRequest {
    pub decision: AppealDecision,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}
