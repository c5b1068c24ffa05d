use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use cloak_db::{Database, time};
use cloak_gateway::Dispatcher;
use cloak_types::events::{ChangeKind, Topic};
use cloak_types::models::Status;

use crate::convert;
use crate::error::{Result, ValidationError};
use crate::identity::{Identity, require};

pub const MAX_STATUS_CHARS: usize = 500;

/// How long a status stays visible.
pub const STATUS_TTL_HOURS: i64 = 24;

/// Short-lived broadcast posts. Expiry is enforced on every read and,
/// separately, by a periodic sweep that removes the rows.
#[derive(Clone)]
pub struct StatusLedger {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl StatusLedger {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn post(&self, actor: Option<&Identity>, content: &str) -> Result<Status> {
        let me = require(actor)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        if content.chars().count() > MAX_STATUS_CHARS {
            return Err(ValidationError::ContentTooLong { max: MAX_STATUS_CHARS }.into());
        }

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let expires_at = created_at + chrono::Duration::hours(STATUS_TTL_HOURS);
        self.db.insert_status(
            &id.to_string(),
            &me.user_id.to_string(),
            content,
            &time::format(created_at),
            &time::format(expires_at),
        )?;

        self.dispatcher.publish(Topic::Statuses, ChangeKind::Insert);
        Ok(Status {
            id,
            user_id: me.user_id,
            username: me.handle.clone(),
            content: content.to_string(),
            created_at,
            expires_at,
        })
    }

    /// Unexpired statuses, newest first, whether or not a sweep has run.
    /// Statuses from authors who blocked the viewer are left out.
    pub fn list_active(&self, viewer: Option<&Identity>) -> Result<Vec<Status>> {
        let viewer_id = viewer.map(|v| v.user_id.to_string()).unwrap_or_default();
        let rows = self.db.get_active_statuses(&time::now(), &viewer_id)?;
        Ok(convert::collect(rows, "status", convert::status))
    }

    /// Delete expired rows. Returns how many went; running it again right
    /// away removes nothing.
    pub fn sweep_expired(&self) -> Result<usize> {
        let n = self.db.delete_expired_statuses(&time::now())?;
        if n > 0 {
            self.dispatcher.publish(Topic::Statuses, ChangeKind::Delete);
        }
        Ok(n)
    }
}

/// Background task that sweeps expired statuses on an interval until
/// `shutdown` is cancelled.
pub async fn run_sweep_loop(ledger: StatusLedger, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Status sweep stopped");
                return;
            }
            _ = interval.tick() => {}
        }

        let ledger = ledger.clone();
        match tokio::task::spawn_blocking(move || ledger.sweep_expired()).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Sweep: removed {} expired statuses", count);
                }
            }
            Ok(Err(e)) => warn!("Sweep error: {}", e),
            Err(e) => warn!("Sweep task failed: {}", e),
        }
    }
}
