use anyhow::Result;

use crate::Database;

impl Database {
    /// Returns false if the block already existed.
    pub fn block_user(&self, blocker_id: &str, blocked_id: &str, created_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO blocked_users (blocker_id, blocked_id, created_at)
                 VALUES (?1, ?2, ?3)",
                (blocker_id, blocked_id, created_at),
            )?;
            Ok(n > 0)
        })
    }

    pub fn unblock_user(&self, blocker_id: &str, blocked_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM blocked_users WHERE blocker_id = ?1 AND blocked_id = ?2",
                (blocker_id, blocked_id),
            )?;
            Ok(n)
        })
    }

    /// `(id, username)` of everyone the user has blocked. Users without a
    /// profile are skipped.
    pub fn list_blocked(&self, blocker_id: &str) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username FROM blocked_users b
                 JOIN users u ON u.id = b.blocked_id
                 WHERE b.blocker_id = ?1
                 ORDER BY b.created_at DESC, u.username",
            )?;
            let rows = stmt
                .query_map([blocker_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_blocked_either(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM blocked_users
                 WHERE (blocker_id = ?1 AND blocked_id = ?2)
                    OR (blocker_id = ?2 AND blocked_id = ?1)",
                (a, b),
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};

    const T: &str = "2024-01-01T00:00:00.000000Z";

    #[test]
    fn block_is_idempotent_and_symmetric_for_checks() {
        let db = db();
        user(&db, "a", "alice");
        user(&db, "b", "bob");

        assert!(db.block_user("a", "b", T).unwrap());
        assert!(!db.block_user("a", "b", T).unwrap());
        assert!(db.is_blocked_either("b", "a").unwrap());
        assert_eq!(db.list_blocked("a").unwrap(), vec![("b".to_string(), "bob".to_string())]);
        assert!(db.list_blocked("b").unwrap().is_empty());

        assert_eq!(db.unblock_user("a", "b").unwrap(), 1);
        assert_eq!(db.unblock_user("a", "b").unwrap(), 0);
        assert!(!db.is_blocked_either("a", "b").unwrap());
    }
}
