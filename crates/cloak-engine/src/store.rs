use std::sync::Arc;

use tracing::{debug, trace};
use uuid::Uuid;

use cloak_db::models::NewMessageRow;
use cloak_db::{Database, time};
use cloak_gateway::Dispatcher;
use cloak_types::events::{ChangeKind, Topic};
use cloak_types::models::{Attachment, Message, MessageTarget};

use crate::convert;
use crate::error::{CloakError, Result, ValidationError};
use crate::identity::{Identity, require};

pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Content given to voice notes sent without a caption.
pub const VOICE_NOTE_CONTENT: &str = "Voice note";

/// Append-only message log for group rooms and two-party conversations.
/// Every write publishes a change on the target's topic.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl MessageStore {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn append(
        &self,
        actor: Option<&Identity>,
        target: MessageTarget,
        content: &str,
        attachment: Option<Attachment>,
    ) -> Result<Message> {
        let me = require(actor)?;

        let mut content = content.trim().to_string();
        if content.is_empty() {
            match &attachment {
                None => return Err(ValidationError::EmptyContent.into()),
                Some(a) if a.is_voice() => content = VOICE_NOTE_CONTENT.to_string(),
                Some(_) => {}
            }
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ValidationError::ContentTooLong { max: MAX_MESSAGE_CHARS }.into());
        }

        let sender = me.user_id.to_string();
        self.check_target(&sender, target, true)?;

        let id = Uuid::new_v4().to_string();
        let target_id = target.id().to_string();
        let created_at = time::now();
        let row = NewMessageRow {
            id: &id,
            target_id: &target_id,
            sender_id: &sender,
            content: &content,
            attachment_url: attachment.as_ref().map(|a| a.url.as_str()),
            attachment_kind: attachment.as_ref().map(|a| a.kind.as_str()),
            created_at: &created_at,
        };
        match target {
            MessageTarget::Group(_) => self.db.insert_group_message(&row)?,
            MessageTarget::Conversation(_) => self.db.insert_direct_message(&row)?,
        }

        trace!(%target, message_id = %id, "Message appended");
        self.dispatcher.publish(Topic::from(target), ChangeKind::Insert);

        Ok(Message {
            id: convert::id(&id)?,
            target,
            sender_id: me.user_id,
            sender_username: me.handle.clone(),
            content,
            is_voice_note: attachment.as_ref().is_some_and(|a| a.is_voice()),
            voice_note_url: attachment.as_ref().filter(|a| a.is_voice()).map(|a| a.url.clone()),
            attachment,
            created_at: convert::timestamp(&created_at)?,
            deleted_at: None,
        })
    }

    /// Oldest first. Soft-deleted direct messages are left out.
    pub fn list(&self, actor: Option<&Identity>, target: MessageTarget) -> Result<Vec<Message>> {
        let me = require(actor)?;
        self.check_target(&me.user_id.to_string(), target, false)?;

        let target_id = target.id().to_string();
        let messages = match target {
            MessageTarget::Group(_) => {
                let rows = self.db.get_group_messages(&target_id)?;
                convert::collect(rows, "message", |r| convert::message(r, true))
            }
            MessageTarget::Conversation(_) => {
                let rows = self.db.get_direct_messages(&target_id)?;
                convert::collect(rows, "message", |r| convert::message(r, false))
            }
        };
        Ok(messages)
    }

    /// Retract every message the actor wrote in the conversation. Returns
    /// the number of messages hidden; zero is not an error.
    pub fn soft_delete(&self, actor: Option<&Identity>, conversation_id: Uuid) -> Result<usize> {
        let me = require(actor)?;
        let target = MessageTarget::Conversation(conversation_id);
        let sender = me.user_id.to_string();
        self.check_target(&sender, target, false)?;

        let n = self
            .db
            .soft_delete_direct_messages(&conversation_id.to_string(), &sender, &time::now())?;
        if n > 0 {
            debug!(user_id = %me.user_id, conversation_id = %conversation_id, "Retracted {} messages", n);
            self.dispatcher.publish(Topic::from(target), ChangeKind::Update);
        }
        Ok(n)
    }

    /// Whether the actor may post to `target` right now. Attachments are
    /// checked with this before anything reaches the blob store.
    pub fn check_can_post(&self, actor: Option<&Identity>, target: MessageTarget) -> Result<()> {
        let me = require(actor)?;
        self.check_target(&me.user_id.to_string(), target, true)
    }

    /// The target must exist; conversations are only open to their two
    /// participants, and writes are refused across a block.
    fn check_target(&self, user_id: &str, target: MessageTarget, writing: bool) -> Result<()> {
        let target_id = target.id().to_string();
        match target {
            MessageTarget::Group(_) => {
                if self.db.get_group(&target_id)?.is_none() {
                    return Err(CloakError::NotFound("group"));
                }
            }
            MessageTarget::Conversation(_) => {
                if !self.db.conversation_exists(&target_id)? {
                    return Err(CloakError::NotFound("conversation"));
                }
                let participants = self.db.get_participants(&target_id)?;
                if !participants.iter().any(|p| p == user_id) {
                    return Err(CloakError::Forbidden);
                }
                if writing {
                    for other in participants.iter().filter(|p| *p != user_id) {
                        if self.db.is_blocked_either(user_id, other)? {
                            return Err(CloakError::Forbidden);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
