use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use cloak_db::queries::Resolution;
use cloak_db::{Database, time};
use cloak_types::models::ConversationSummary;

use crate::convert;
use crate::error::{CloakError, Result, ValidationError};
use crate::identity::{Identity, require};

/// Finds or creates the single two-party conversation for a pair of users.
#[derive(Clone)]
pub struct ConversationResolver {
    db: Arc<Database>,
}

impl ConversationResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The conversation between the actor and `other`, created on first use.
    /// Repeated calls for the same pair, in either direction, return the
    /// same id.
    pub fn resolve_or_create(&self, actor: Option<&Identity>, other: Uuid) -> Result<Uuid> {
        let me = require(actor)?;
        if me.user_id == other {
            return Err(ValidationError::SelfTarget.into());
        }

        let a = me.user_id.to_string();
        let b = other.to_string();
        if self.db.get_user_by_id(&b)?.is_none() {
            return Err(CloakError::NotFound("user"));
        }
        if self.db.is_blocked_either(&a, &b)? {
            return Err(CloakError::Forbidden);
        }

        let fresh = Uuid::new_v4();
        let resolution = self
            .db
            .resolve_conversation(&a, &b, &fresh.to_string(), &time::now())?;
        match &resolution {
            Resolution::Created(id) => {
                info!(conversation_id = %id, user_id = %me.user_id, other = %other, "Conversation created")
            }
            Resolution::Existing(id) => debug!(conversation_id = %id, "Conversation resolved"),
        }
        Ok(convert::id(resolution.id())?)
    }

    /// The actor's conversations, most recent activity first.
    pub fn list_conversations(&self, actor: Option<&Identity>) -> Result<Vec<ConversationSummary>> {
        let me = require(actor)?;
        let rows = self.db.list_conversations_for(&me.user_id.to_string())?;
        Ok(convert::collect(rows, "conversation", convert::conversation))
    }
}
