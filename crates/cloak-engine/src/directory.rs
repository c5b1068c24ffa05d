use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use cloak_db::{Database, time};
use cloak_types::models::Group;

use crate::convert;
use crate::error::{CloakError, Result};
use crate::identity::{Identity, require};

/// Group catalog and memberships.
#[derive(Clone)]
pub struct GroupDirectory {
    db: Arc<Database>,
}

impl GroupDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The whole catalog, ordered by type then name.
    pub fn list_groups(&self) -> Result<Vec<Group>> {
        Ok(convert::collect(self.db.list_groups()?, "group", convert::group))
    }

    pub fn list_memberships_for(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let ids = self.db.get_membership_ids(&user_id.to_string())?;
        Ok(convert::collect(ids, "membership", |raw| convert::id(&raw))
            .into_iter()
            .collect())
    }

    pub fn my_groups(&self, actor: Option<&Identity>) -> Result<Vec<Group>> {
        let me = require(actor)?;
        let rows = self.db.get_groups_for_user(&me.user_id.to_string())?;
        Ok(convert::collect(rows, "group", convert::group))
    }

    /// Fails with `AlreadyMember` if the membership exists.
    pub fn join(&self, actor: Option<&Identity>, group_id: Uuid) -> Result<()> {
        let me = require(actor)?;
        let gid = group_id.to_string();
        if self.db.get_group(&gid)?.is_none() {
            return Err(CloakError::NotFound("group"));
        }
        if !self.db.add_membership(&gid, &me.user_id.to_string(), &time::now())? {
            return Err(CloakError::AlreadyMember);
        }
        info!(user_id = %me.user_id, group_id = %group_id, "Joined group");
        Ok(())
    }

    /// Leaving a group you are not in succeeds without doing anything.
    pub fn leave(&self, actor: Option<&Identity>, group_id: Uuid) -> Result<()> {
        let me = require(actor)?;
        let removed = self
            .db
            .remove_membership(&group_id.to_string(), &me.user_id.to_string())?;
        if removed > 0 {
            info!(user_id = %me.user_id, group_id = %group_id, "Left group");
        } else {
            debug!(user_id = %me.user_id, group_id = %group_id, "Leave without membership");
        }
        Ok(())
    }
}
