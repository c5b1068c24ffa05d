//! Row → model conversion. Ids and timestamps are TEXT in the store.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use cloak_db::models::{AppealRow, ConversationRow, GroupRow, MessageRow, StatusRow, UserRow};
use cloak_db::time;
use cloak_types::models::{
    Appeal, Attachment, ConversationSummary, Group, Message, MessageTarget, PLACEHOLDER_HANDLE,
    Status, User,
};

pub(crate) fn id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("bad id '{}'", raw))
}

pub(crate) fn timestamp(raw: &str) -> Result<DateTime<Utc>> {
    time::parse(raw).ok_or_else(|| anyhow!("bad timestamp '{}'", raw))
}

fn opt_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(timestamp).transpose()
}

fn handle_or_placeholder(handle: Option<String>) -> String {
    handle.unwrap_or_else(|| PLACEHOLDER_HANDLE.to_string())
}

/// Convert a batch of rows, skipping (and logging) rows that do not parse.
pub(crate) fn collect<R, T>(rows: Vec<R>, what: &str, f: impl Fn(R) -> Result<T>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match f(row) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Skipping corrupt {} row: {:#}", what, e);
                None
            }
        })
        .collect()
}

pub(crate) fn user(row: UserRow) -> Result<User> {
    Ok(User {
        id: id(&row.id)?,
        username: row.username,
        is_suspended: row.is_suspended,
        suspend_reason: row.suspend_reason,
        suspended_at: opt_timestamp(row.suspended_at.as_deref())?,
        created_at: timestamp(&row.created_at)?,
    })
}

pub(crate) fn group(row: GroupRow) -> Result<Group> {
    Ok(Group {
        id: id(&row.id)?,
        name: row.name,
        description: row.description,
        kind: row.kind.parse().map_err(|e: String| anyhow!(e))?,
        created_at: timestamp(&row.created_at)?,
    })
}

pub(crate) fn conversation(row: ConversationRow) -> Result<ConversationSummary> {
    Ok(ConversationSummary {
        id: id(&row.id)?,
        other_user_id: id(&row.other_user_id)?,
        other_username: handle_or_placeholder(row.other_username),
        created_at: timestamp(&row.created_at)?,
        updated_at: timestamp(&row.updated_at)?,
    })
}

/// `group` selects which kind of target `row.target_id` names.
pub(crate) fn message(row: MessageRow, group: bool) -> Result<Message> {
    let target_id = id(&row.target_id)?;
    let target = if group {
        MessageTarget::Group(target_id)
    } else {
        MessageTarget::Conversation(target_id)
    };

    let attachment = match (row.attachment_url, row.attachment_kind.as_deref()) {
        (Some(url), Some(kind)) => match kind.parse() {
            Ok(kind) => Some(Attachment { url, kind }),
            Err(e) => {
                warn!(message_id = %row.id, "Dropping attachment: {}", e);
                None
            }
        },
        _ => None,
    };

    Ok(Message {
        id: id(&row.id)?,
        target,
        sender_id: id(&row.sender_id)?,
        sender_username: handle_or_placeholder(row.sender_username),
        content: row.content,
        is_voice_note: attachment.as_ref().is_some_and(|a| a.is_voice()),
        voice_note_url: attachment.as_ref().filter(|a| a.is_voice()).map(|a| a.url.clone()),
        attachment,
        created_at: timestamp(&row.created_at)?,
        deleted_at: opt_timestamp(row.deleted_at.as_deref())?,
    })
}

pub(crate) fn status(row: StatusRow) -> Result<Status> {
    Ok(Status {
        id: id(&row.id)?,
        user_id: id(&row.user_id)?,
        username: handle_or_placeholder(row.username),
        content: row.content,
        created_at: timestamp(&row.created_at)?,
        expires_at: timestamp(&row.expires_at)?,
    })
}

pub(crate) fn appeal(row: AppealRow) -> Result<Appeal> {
    Ok(Appeal {
        id: id(&row.id)?,
        user_id: id(&row.user_id)?,
        username: handle_or_placeholder(row.username),
        message: row.message,
        status: row.status.parse().map_err(|e: String| anyhow!(e))?,
        reviewed_by: row.reviewed_by.as_deref().map(id).transpose()?,
        reviewed_at: opt_timestamp(row.reviewed_at.as_deref())?,
        created_at: timestamp(&row.created_at)?,
    })
}
