use anyhow::Result;

use crate::Database;
use crate::models::StatusRow;

impl Database {
    pub fn insert_status(
        &self,
        id: &str,
        user_id: &str,
        content: &str,
        created_at: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO statuses (id, user_id, content, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, user_id, content, created_at, expires_at),
            )?;
            Ok(())
        })
    }

    /// Statuses that have not expired as of `now`, newest first. Authors who
    /// blocked `viewer_id` are left out.
    pub fn get_active_statuses(&self, now: &str, viewer_id: &str) -> Result<Vec<StatusRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.user_id, u.username, s.content, s.created_at, s.expires_at
                 FROM statuses s
                 LEFT JOIN users u ON u.id = s.user_id
                 WHERE s.expires_at > ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM blocked_users b
                       WHERE b.blocker_id = s.user_id AND b.blocked_id = ?2
                   )
                 ORDER BY s.created_at DESC, s.id",
            )?;
            let rows = stmt
                .query_map((now, viewer_id), |row| {
                    Ok(StatusRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        username: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                        expires_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Physically remove expired statuses. Returns the number removed.
    pub fn delete_expired_statuses(&self, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM statuses WHERE expires_at <= ?1", [now])?;
            Ok(n)
        })
    }
}
