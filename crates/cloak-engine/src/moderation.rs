use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use cloak_db::queries::ReportInsert;
use cloak_db::{Database, time};
use cloak_gateway::Dispatcher;
use cloak_types::events::GatewayEvent;
use cloak_types::models::{AccountState, Appeal, AppealDecision, AppealStatus, Role};

use crate::convert;
use crate::error::{CloakError, Result, ValidationError};
use crate::identity::{Identity, require};

/// Distinct reports that suspend an account.
pub const SUSPEND_THRESHOLD: i64 = 3;

pub const AUTO_SUSPEND_REASON: &str = "Automatically suspended after 3 reports";

pub const MAX_REASON_CHARS: usize = 500;
pub const MAX_APPEAL_CHARS: usize = 1000;

/// Result of a successful report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub report_id: Uuid,
    pub reported_user_suspended: bool,
}

/// Capability check for the review surface: `special` or `admin`.
pub fn can_review(roles: &[Role]) -> bool {
    roles.iter().any(|r| matches!(r, Role::Special | Role::Admin))
}

/// Report intake, automatic suspension, appeals and their review.
#[derive(Clone)]
pub struct ModerationEngine {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl ModerationEngine {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// File a report. The report that brings the user to the threshold
    /// suspends them in the same write and revokes their live sessions.
    pub fn report(&self, actor: Option<&Identity>, reported: Uuid, reason: &str) -> Result<ReportOutcome> {
        let me = require(actor)?;
        if me.user_id == reported {
            return Err(ValidationError::SelfTarget.into());
        }
        let reason = checked_text(reason, MAX_REASON_CHARS)?;

        let reported_id = reported.to_string();
        if self.db.get_user_by_id(&reported_id)?.is_none() {
            return Err(CloakError::NotFound("user"));
        }

        let report_id = Uuid::new_v4();
        let outcome = self.db.insert_report_and_maybe_suspend(
            &report_id.to_string(),
            &me.user_id.to_string(),
            &reported_id,
            reason,
            &time::now(),
            SUSPEND_THRESHOLD,
            AUTO_SUSPEND_REASON,
        )?;

        match outcome {
            ReportInsert::Duplicate => Err(CloakError::DuplicateReport),
            ReportInsert::Inserted {
                total,
                suspended,
                newly_suspended,
            } => {
                info!(user_id = %reported, reporter = %me.user_id, total, "Report filed");
                if newly_suspended {
                    warn!(user_id = %reported, "Account suspended after {} reports", total);
                    self.dispatcher
                        .broadcast(GatewayEvent::SessionRevoked { user_id: reported });
                }
                Ok(ReportOutcome {
                    report_id,
                    reported_user_suspended: suspended,
                })
            }
        }
    }

    /// Open an appeal for a suspended account. The caller is responsible for
    /// having authenticated `user_id`.
    pub fn submit_appeal(&self, user_id: Uuid, message: &str) -> Result<Appeal> {
        let message = checked_text(message, MAX_APPEAL_CHARS)?;
        let uid = user_id.to_string();
        let user = self
            .db
            .get_user_by_id(&uid)?
            .ok_or(CloakError::NotFound("user"))?;
        if !user.is_suspended {
            return Err(ValidationError::NotSuspended.into());
        }

        let appeal_id = Uuid::new_v4();
        if !self
            .db
            .insert_appeal(&appeal_id.to_string(), &uid, message, &time::now())?
        {
            return Err(ValidationError::AppealAlreadyPending.into());
        }

        info!(appeal_id = %appeal_id, user_id = %user_id, "Appeal submitted");
        self.load_appeal(appeal_id)
    }

    /// Decide a pending appeal. Approval reinstates the account.
    pub fn review(
        &self,
        reviewer: Option<&Identity>,
        appeal_id: Uuid,
        decision: AppealDecision,
    ) -> Result<Appeal> {
        let me = self.require_reviewer(reviewer)?;

        let current = self.load_appeal(appeal_id)?;
        let next = decision.resulting_status();
        if !current.status.can_transition_to(next) {
            return Err(CloakError::AppealAlreadyReviewed);
        }

        let reinstate = next == AppealStatus::Approved;
        let decided = self.db.review_appeal(
            &appeal_id.to_string(),
            next.as_str(),
            &me.user_id.to_string(),
            &time::now(),
            reinstate,
        )?;
        if !decided {
            // Someone else decided it between the read and the write
            return Err(CloakError::AppealAlreadyReviewed);
        }

        info!(
            appeal_id = %appeal_id,
            user_id = %current.user_id,
            reviewer = %me.user_id,
            "Appeal {}",
            next.as_str()
        );
        self.load_appeal(appeal_id)
    }

    /// Every appeal, newest first. Reviewers only.
    pub fn list_appeals(&self, reviewer: Option<&Identity>) -> Result<Vec<Appeal>> {
        self.require_reviewer(reviewer)?;
        Ok(convert::collect(self.db.list_appeals()?, "appeal", convert::appeal))
    }

    pub fn roles(&self, user_id: Uuid) -> Result<Vec<Role>> {
        let raw = self.db.get_roles(&user_id.to_string())?;
        Ok(convert::collect(raw, "role", |r| {
            r.parse::<Role>().map_err(|e| anyhow::anyhow!(e))
        }))
    }

    /// Returns true if the role was newly granted.
    pub fn grant_role(&self, user_id: Uuid, role: Role) -> Result<bool> {
        let uid = user_id.to_string();
        if self.db.get_user_by_id(&uid)?.is_none() {
            return Err(CloakError::NotFound("user"));
        }
        let granted = self.db.grant_role(&uid, role.as_str())?;
        if granted {
            info!(user_id = %user_id, role = role.as_str(), "Role granted");
        }
        Ok(granted)
    }

    pub fn account_state(&self, user_id: Uuid) -> Result<AccountState> {
        let uid = user_id.to_string();
        let user = self
            .db
            .get_user_by_id(&uid)?
            .ok_or(CloakError::NotFound("user"))?;
        if !user.is_suspended {
            return Ok(AccountState::Active);
        }
        if self.db.has_pending_appeal(&uid)? {
            Ok(AccountState::PendingAppeal)
        } else {
            Ok(AccountState::Suspended)
        }
    }

    fn require_reviewer<'a>(&self, reviewer: Option<&'a Identity>) -> Result<&'a Identity> {
        let me = require(reviewer)?;
        if !can_review(&self.roles(me.user_id)?) {
            return Err(CloakError::Forbidden);
        }
        Ok(me)
    }

    fn load_appeal(&self, appeal_id: Uuid) -> Result<Appeal> {
        let row = self
            .db
            .get_appeal(&appeal_id.to_string())?
            .ok_or(CloakError::NotFound("appeal"))?;
        Ok(convert::appeal(row)?)
    }
}

fn checked_text(raw: &str, max: usize) -> Result<&str> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyContent.into());
    }
    if text.chars().count() > max {
        return Err(ValidationError::ContentTooLong { max }.into());
    }
    Ok(text)
}
