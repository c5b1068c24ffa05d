use anyhow::Result;
use rusqlite::Row;

use super::{OptionalExt, is_unique_violation};
use crate::Database;
use crate::models::GroupRow;

impl Database {
    pub fn list_groups(&self) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, type, created_at FROM chat_groups
                 ORDER BY type, name",
            )?;
            let rows = stmt
                .query_map([], group_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_group(&self, id: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, description, type, created_at FROM chat_groups WHERE id = ?1",
                [id],
                group_from_row,
            )
            .optional()
        })
    }

    /// Groups the user belongs to, with their catalog details.
    pub fn get_groups_for_user(&self, user_id: &str) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.description, g.type, g.created_at
                 FROM group_members gm
                 JOIN chat_groups g ON g.id = gm.group_id
                 WHERE gm.user_id = ?1
                 ORDER BY g.type, g.name",
            )?;
            let rows = stmt
                .query_map([user_id], group_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_membership_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT group_id FROM group_members WHERE user_id = ?1")?;
            let rows = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if the membership row already existed.
    pub fn add_membership(&self, group_id: &str, user_id: &str, joined_at: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            match conn.execute(
                "INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                (group_id, user_id, joined_at),
            ) {
                Ok(_) => Ok(true),
                Err(e) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Returns the number of rows removed (0 when not a member).
    pub fn remove_membership(&self, group_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                (group_id, user_id),
            )?;
            Ok(n)
        })
    }
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        kind: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::db;

    const HUB: &str = "00000000-0000-0000-0000-000000000101";

    #[test]
    fn join_twice_reports_existing_membership() {
        let db = db();
        assert!(db.add_membership(HUB, "u1", "t").unwrap());
        assert!(!db.add_membership(HUB, "u1", "t").unwrap());
        assert_eq!(db.get_membership_ids("u1").unwrap(), vec![HUB.to_string()]);
    }

    #[test]
    fn leave_without_membership_removes_nothing() {
        let db = db();
        assert_eq!(db.remove_membership(HUB, "u1").unwrap(), 0);
        db.add_membership(HUB, "u1", "t").unwrap();
        assert_eq!(db.remove_membership(HUB, "u1").unwrap(), 1);
        assert!(db.get_groups_for_user("u1").unwrap().is_empty());
    }

    #[test]
    fn catalog_orders_by_type_then_name() {
        let db = db();
        let groups = db.list_groups().unwrap();
        assert_eq!(groups.len(), 6);
        assert_eq!(groups[0].name, "Gaming Community");
        assert_eq!(groups[2].name, "100lvl Hub");
        assert!(db.get_group(HUB).unwrap().is_some());
        assert!(db.get_group("missing").unwrap().is_none());
    }
}
