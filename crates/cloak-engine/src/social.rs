use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use cloak_db::{Database, time};
use cloak_types::models::UserSummary;

use crate::convert;
use crate::error::{CloakError, Result, ValidationError};
use crate::identity::{Identity, require};

pub const SEARCH_LIMIT: u32 = 10;

/// User search and blocking.
#[derive(Clone)]
pub struct SocialGraph {
    db: Arc<Database>,
}

impl SocialGraph {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Case-insensitive substring match on handles, never including the
    /// actor. A blank term matches nobody.
    pub fn search_users(&self, actor: Option<&Identity>, term: &str) -> Result<Vec<UserSummary>> {
        let me = require(actor)?;
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .db
            .search_users(term, &me.user_id.to_string(), SEARCH_LIMIT)?;
        Ok(convert::collect(rows, "user", |(id, username)| {
            Ok(UserSummary {
                id: convert::id(&id)?,
                username,
            })
        }))
    }

    /// Blocking twice is the same as blocking once.
    pub fn block(&self, actor: Option<&Identity>, other: Uuid) -> Result<()> {
        let me = require(actor)?;
        if me.user_id == other {
            return Err(ValidationError::SelfTarget.into());
        }
        let other_id = other.to_string();
        if self.db.get_user_by_id(&other_id)?.is_none() {
            return Err(CloakError::NotFound("user"));
        }
        if self
            .db
            .block_user(&me.user_id.to_string(), &other_id, &time::now())?
        {
            info!(user_id = %me.user_id, blocked = %other, "User blocked");
        }
        Ok(())
    }

    pub fn unblock(&self, actor: Option<&Identity>, other: Uuid) -> Result<()> {
        let me = require(actor)?;
        self.db
            .unblock_user(&me.user_id.to_string(), &other.to_string())?;
        Ok(())
    }

    pub fn list_blocked(&self, actor: Option<&Identity>) -> Result<Vec<UserSummary>> {
        let me = require(actor)?;
        let rows = self.db.list_blocked(&me.user_id.to_string())?;
        Ok(convert::collect(rows, "user", |(id, username)| {
            Ok(UserSummary {
                id: convert::id(&id)?,
                username,
            })
        }))
    }
}
