use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle shown for a sender whose profile row is missing.
pub const PLACEHOLDER_HANDLE: &str = "anonymous";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub is_suspended: bool,
    pub suspend_reason: Option<String>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Public view of another user, as returned by search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
}

// -- Groups --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Level,
    Interest,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Level => "level",
            GroupKind::Interest => "interest",
        }
    }
}

impl FromStr for GroupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "level" => Ok(GroupKind::Level),
            "interest" => Ok(GroupKind::Interest),
            other => Err(format!("unknown group type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub created_at: DateTime<Utc>,
}

// -- Conversations --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub other_user_id: Uuid,
    pub other_username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Messages --

/// Where a message lives: a group room or a two-party conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum MessageTarget {
    Group(Uuid),
    Conversation(Uuid),
}

impl MessageTarget {
    pub fn id(&self) -> Uuid {
        match self {
            MessageTarget::Group(id) | MessageTarget::Conversation(id) => *id,
        }
    }
}

impl fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageTarget::Group(id) => write!(f, "group:{}", id),
            MessageTarget::Conversation(id) => write!(f, "conversation:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Pdf,
    Video,
    Voice,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Pdf => "pdf",
            MediaKind::Video => "video",
            MediaKind::Voice => "voice",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "pdf" => Ok(MediaKind::Pdf),
            "video" => Ok(MediaKind::Video),
            "voice" => Ok(MediaKind::Voice),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub kind: MediaKind,
}

impl Attachment {
    pub fn is_voice(&self) -> bool {
        self.kind == MediaKind::Voice
    }
}

/// A group message or a direct message. `deleted_at` is only ever set on
/// direct messages, and deleted rows never leave the store on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub target: MessageTarget,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub is_voice_note: bool,
    pub voice_note_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// -- Statuses --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// -- Moderation --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

impl AppealStatus {
    /// Pending appeals are the only ones a reviewer may decide.
    pub fn can_transition_to(&self, next: AppealStatus) -> bool {
        matches!(
            (self, next),
            (AppealStatus::Pending, AppealStatus::Approved)
                | (AppealStatus::Pending, AppealStatus::Rejected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "pending",
            AppealStatus::Approved => "approved",
            AppealStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for AppealStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppealStatus::Pending),
            "approved" => Ok(AppealStatus::Approved),
            "rejected" => Ok(AppealStatus::Rejected),
            other => Err(format!("unknown appeal status '{}'", other)),
        }
    }
}

/// A reviewer's verdict on a pending appeal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealDecision {
    #[serde(alias = "approved", alias = "pardon")]
    Approve,
    #[serde(alias = "rejected")]
    Reject,
}

impl AppealDecision {
    pub fn resulting_status(&self) -> AppealStatus {
        match self {
            AppealDecision::Approve => AppealStatus::Approved,
            AppealDecision::Reject => AppealStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appeal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub message: String,
    pub status: AppealStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Flat role set. `Special` is the reviewer role; nothing inherits from anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "reviewer")]
    Special,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Special => "special",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "special" | "reviewer" => Ok(Role::Special),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Where an account sits in the moderation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Active,
    Suspended,
    PendingAppeal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appeal_transitions_only_leave_pending() {
        assert!(AppealStatus::Pending.can_transition_to(AppealStatus::Approved));
        assert!(AppealStatus::Pending.can_transition_to(AppealStatus::Rejected));
        assert!(!AppealStatus::Approved.can_transition_to(AppealStatus::Rejected));
        assert!(!AppealStatus::Rejected.can_transition_to(AppealStatus::Approved));
        assert!(!AppealStatus::Pending.can_transition_to(AppealStatus::Pending));
    }

    #[test]
    fn decision_accepts_status_spelling() {
        let d: AppealDecision = serde_json::from_str("\"approved\"").unwrap();
        assert_eq!(d, AppealDecision::Approve);
        let d: AppealDecision = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(d.resulting_status(), AppealStatus::Rejected);
    }

    #[test]
    fn role_parses_reviewer_alias() {
        assert_eq!("reviewer".parse::<Role>().unwrap(), Role::Special);
        assert_eq!(Role::Special.as_str(), "special");
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn target_serializes_tagged() {
        let id = Uuid::nil();
        let json = serde_json::to_value(MessageTarget::Conversation(id)).unwrap();
        assert_eq!(json["kind"], "conversation");
        assert_eq!(json["id"], id.to_string());
    }
}
