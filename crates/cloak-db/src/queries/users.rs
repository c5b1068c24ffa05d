use anyhow::Result;
use rusqlite::{Connection, Row};

use super::{OptionalExt, escape_like, is_unique_violation};
use crate::Database;
use crate::models::UserRow;

const USER_COLUMNS: &str =
    "id, username, password, is_suspended, suspend_reason, suspended_at, created_at";

impl Database {
    /// Create a profile and give it the base `user` role.
    /// Returns false if the username is already taken.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, created_at),
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
            tx.execute(
                "INSERT INTO user_roles (user_id, role) VALUES (?1, 'user')",
                [id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_username_by_id(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT username FROM users WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    /// Case-insensitive substring search on handles, excluding one user.
    pub fn search_users(
        &self,
        term: &str,
        exclude_id: &str,
        limit: u32,
    ) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let pattern = format!("%{}%", escape_like(term));
            let mut stmt = conn.prepare(
                "SELECT id, username FROM users
                 WHERE username LIKE ?1 ESCAPE '\\' AND id != ?2
                 ORDER BY username
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, exclude_id, limit], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Roles --

    pub fn get_roles(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT role FROM user_roles WHERE user_id = ?1 ORDER BY role")?;
            let rows = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns true if the role was newly granted.
    pub fn grant_role(&self, user_id: &str, role: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)",
                (user_id, role),
            )?;
            Ok(n > 0)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], user_from_row).optional()
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        is_suspended: row.get(3)?,
        suspend_reason: row.get(4)?,
        suspended_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}
