/// Database row types, mapped directly from SQLite rows.
/// Distinct from cloak-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub is_suspended: bool,
    pub suspend_reason: Option<String>,
    pub suspended_at: Option<String>,
    pub created_at: String,
}

pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: String,
    pub created_at: String,
}

/// A conversation seen from one participant, with the other side's handle.
pub struct ConversationRow {
    pub id: String,
    pub other_user_id: String,
    pub other_username: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Shared shape of `messages` and `direct_messages`. `target_id` is the
/// group id or the conversation id; `deleted_at` is always `None` for
/// group messages.
pub struct MessageRow {
    pub id: String,
    pub target_id: String,
    pub sender_id: String,
    pub sender_username: Option<String>,
    pub content: String,
    pub attachment_url: Option<String>,
    pub attachment_kind: Option<String>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

/// Insert payload for either message table.
pub struct NewMessageRow<'a> {
    pub id: &'a str,
    pub target_id: &'a str,
    pub sender_id: &'a str,
    pub content: &'a str,
    pub attachment_url: Option<&'a str>,
    pub attachment_kind: Option<&'a str>,
    pub created_at: &'a str,
}

pub struct StatusRow {
    pub id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub content: String,
    pub created_at: String,
    pub expires_at: String,
}

pub struct AppealRow {
    pub id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub message: String,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}
