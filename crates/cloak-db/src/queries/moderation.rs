use anyhow::Result;
use rusqlite::{Row, TransactionBehavior};

use super::{OptionalExt, is_unique_violation};
use crate::Database;
use crate::models::AppealRow;

/// Outcome of filing a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportInsert {
    /// The reporter already reported this user; nothing was written.
    Duplicate,
    Inserted {
        /// Reports against the user, including this one.
        total: i64,
        /// Whether the user is suspended after this report.
        suspended: bool,
        /// Whether this report is the one that flipped the flag.
        newly_suspended: bool,
    },
}

const APPEAL_SELECT: &str = "SELECT a.id, a.user_id, u.username, a.message, a.status,
        a.reviewed_by, a.reviewed_at, a.created_at
     FROM appeals a
     LEFT JOIN users u ON u.id = a.user_id";

impl Database {
    /// Insert a report, recount, and suspend the reported user once the
    /// count reaches `threshold`. All of it runs in one transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_report_and_maybe_suspend(
        &self,
        id: &str,
        reporter_id: &str,
        reported_user_id: &str,
        reason: &str,
        now: &str,
        threshold: i64,
        suspend_reason: &str,
    ) -> Result<ReportInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let inserted = tx.execute(
                "INSERT INTO reports (id, reporter_id, reported_user_id, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, reporter_id, reported_user_id, reason, now),
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(ReportInsert::Duplicate),
                Err(e) => return Err(e.into()),
            }

            let total: i64 = tx.query_row(
                "SELECT COUNT(*) FROM reports WHERE reported_user_id = ?1",
                [reported_user_id],
                |row| row.get(0),
            )?;

            let mut newly_suspended = false;
            if total >= threshold {
                let n = tx.execute(
                    "UPDATE users SET is_suspended = 1, suspend_reason = ?2, suspended_at = ?3
                     WHERE id = ?1 AND is_suspended = 0",
                    (reported_user_id, suspend_reason, now),
                )?;
                newly_suspended = n > 0;
            }

            let suspended: bool = tx.query_row(
                "SELECT is_suspended FROM users WHERE id = ?1",
                [reported_user_id],
                |row| row.get(0),
            )?;

            tx.commit()?;
            Ok(ReportInsert::Inserted {
                total,
                suspended,
                newly_suspended,
            })
        })
    }

    // -- Appeals --

    /// Insert a pending appeal unless the user already has one open.
    /// Returns false when a pending appeal exists.
    pub fn insert_appeal(
        &self,
        id: &str,
        user_id: &str,
        message: &str,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let pending: i64 = tx.query_row(
                "SELECT COUNT(*) FROM appeals WHERE user_id = ?1 AND status = 'pending'",
                [user_id],
                |row| row.get(0),
            )?;
            if pending > 0 {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO appeals (id, user_id, message, status, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
                (id, user_id, message, created_at),
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_appeal(&self, id: &str) -> Result<Option<AppealRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE a.id = ?1", APPEAL_SELECT);
            conn.query_row(&sql, [id], appeal_from_row).optional()
        })
    }

    /// Every appeal, newest first.
    pub fn list_appeals(&self) -> Result<Vec<AppealRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} ORDER BY a.created_at DESC, a.id", APPEAL_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], appeal_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn has_pending_appeal(&self, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM appeals WHERE user_id = ?1 AND status = 'pending'",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    /// Decide a pending appeal. When `reinstate` is set the appellant's
    /// suspension fields are cleared in the same transaction.
    /// Returns false if the appeal was not pending.
    pub fn review_appeal(
        &self,
        appeal_id: &str,
        status: &str,
        reviewer_id: &str,
        reviewed_at: &str,
        reinstate: bool,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let n = tx.execute(
                "UPDATE appeals SET status = ?2, reviewed_by = ?3, reviewed_at = ?4
                 WHERE id = ?1 AND status = 'pending'",
                (appeal_id, status, reviewer_id, reviewed_at),
            )?;
            if n == 0 {
                return Ok(false);
            }
            if reinstate {
                tx.execute(
                    "UPDATE users SET is_suspended = 0, suspend_reason = NULL, suspended_at = NULL
                     WHERE id = (SELECT user_id FROM appeals WHERE id = ?1)",
                    [appeal_id],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
    }
}

fn appeal_from_row(row: &Row<'_>) -> rusqlite::Result<AppealRow> {
    Ok(AppealRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        message: row.get(3)?,
        status: row.get(4)?,
        reviewed_by: row.get(5)?,
        reviewed_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db, user};

    const REASON: &str = "Automatically suspended after 3 reports";

    fn report(db: &Database, id: &str, reporter: &str, reported: &str) -> ReportInsert {
        db.insert_report_and_maybe_suspend(id, reporter, reported, "spam", &crate::time::now(), 3, REASON)
            .unwrap()
    }

    #[test]
    fn duplicate_report_writes_nothing() {
        let db = db();
        user(&db, "bob", "bob");
        assert!(matches!(report(&db, "r1", "alice", "bob"), ReportInsert::Inserted { total: 1, .. }));
        assert_eq!(report(&db, "r2", "alice", "bob"), ReportInsert::Duplicate);
        assert!(matches!(report(&db, "r3", "carol", "bob"), ReportInsert::Inserted { total: 2, .. }));
    }

    #[test]
    fn third_report_suspends_once() {
        let db = db();
        user(&db, "bob", "bob");
        report(&db, "r1", "a", "bob");
        report(&db, "r2", "b", "bob");
        assert_eq!(
            report(&db, "r3", "c", "bob"),
            ReportInsert::Inserted { total: 3, suspended: true, newly_suspended: true }
        );
        assert_eq!(
            report(&db, "r4", "d", "bob"),
            ReportInsert::Inserted { total: 4, suspended: true, newly_suspended: false }
        );

        let bob = db.get_user_by_id("bob").unwrap().unwrap();
        assert!(bob.is_suspended);
        assert_eq!(bob.suspend_reason.as_deref(), Some(REASON));
        assert!(bob.suspended_at.is_some());
    }

    #[test]
    fn approving_clears_suspension_and_cannot_repeat() {
        let db = db();
        user(&db, "bob", "bob");
        for (id, reporter) in [("r1", "a"), ("r2", "b"), ("r3", "c")] {
            report(&db, id, reporter, "bob");
        }

        assert!(db.insert_appeal("ap1", "bob", "it was a mistake", &crate::time::now()).unwrap());
        assert!(!db.insert_appeal("ap2", "bob", "again", &crate::time::now()).unwrap());
        assert!(db.has_pending_appeal("bob").unwrap());

        assert!(db.review_appeal("ap1", "approved", "admin", &crate::time::now(), true).unwrap());
        assert!(!db.review_appeal("ap1", "rejected", "admin", &crate::time::now(), false).unwrap());

        let appeal = db.get_appeal("ap1").unwrap().unwrap();
        assert_eq!(appeal.status, "approved");
        assert_eq!(appeal.reviewed_by.as_deref(), Some("admin"));
        assert_eq!(appeal.username.as_deref(), Some("bob"));

        let bob = db.get_user_by_id("bob").unwrap().unwrap();
        assert!(!bob.is_suspended);
        assert!(bob.suspend_reason.is_none());
        assert!(bob.suspended_at.is_none());
    }
}
