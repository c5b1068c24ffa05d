use anyhow::Result;
use rusqlite::Row;

use crate::Database;
use crate::models::{MessageRow, NewMessageRow};

impl Database {
    pub fn insert_group_message(&self, msg: &NewMessageRow<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, group_id, sender_id, content, attachment_url, attachment_kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id,
                    msg.target_id,
                    msg.sender_id,
                    msg.content,
                    msg.attachment_url,
                    msg.attachment_kind,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Insert a direct message and bump the conversation's `updated_at`.
    pub fn insert_direct_message(&self, msg: &NewMessageRow<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO direct_messages
                    (id, conversation_id, sender_id, content, attachment_url, attachment_kind,
                     created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id,
                    msg.target_id,
                    msg.sender_id,
                    msg.content,
                    msg.attachment_url,
                    msg.attachment_kind,
                    msg.created_at,
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                (msg.target_id, msg.created_at),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Oldest first, ties broken by insertion order.
    pub fn get_group_messages(&self, group_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.group_id, m.sender_id, u.username, m.content,
                        m.attachment_url, m.attachment_kind, m.created_at, NULL
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.group_id = ?1
                 ORDER BY m.created_at ASC, m.seq ASC",
            )?;
            let rows = stmt
                .query_map([group_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Visible (not soft-deleted) messages, oldest first.
    pub fn get_direct_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.conversation_id, m.sender_id, u.username, m.content,
                        m.attachment_url, m.attachment_kind, m.created_at, m.deleted_at
                 FROM direct_messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.conversation_id = ?1 AND m.deleted_at IS NULL
                 ORDER BY m.created_at ASC, m.seq ASC",
            )?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark every live message the sender wrote in the conversation as
    /// deleted. Returns how many rows changed.
    pub fn soft_delete_direct_messages(
        &self,
        conversation_id: &str,
        sender_id: &str,
        deleted_at: &str,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE direct_messages SET deleted_at = ?3
                 WHERE conversation_id = ?1 AND sender_id = ?2 AND deleted_at IS NULL",
                (conversation_id, sender_id, deleted_at),
            )?;
            Ok(n)
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        target_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row.get(3)?,
        content: row.get(4)?,
        attachment_url: row.get(5)?,
        attachment_kind: row.get(6)?,
        created_at: row.get(7)?,
        deleted_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::models::NewMessageRow;
    use crate::queries::test_support::{db, user};

    const HUB: &str = "00000000-0000-0000-0000-000000000101";
    const T0: &str = "2024-01-01T00:00:00.000000Z";

    fn text<'a>(id: &'a str, target: &'a str, sender: &'a str, at: &'a str) -> NewMessageRow<'a> {
        NewMessageRow {
            id,
            target_id: target,
            sender_id: sender,
            content: id,
            attachment_url: None,
            attachment_kind: None,
            created_at: at,
        }
    }

    fn conversation(db: &Database) -> String {
        user(db, "a", "alice");
        user(db, "b", "bob");
        db.resolve_conversation("a", "b", "c1", T0).unwrap();
        "c1".to_string()
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let db = db();
        user(&db, "a", "alice");
        for id in ["m1", "m2", "m3"] {
            db.insert_group_message(&text(id, HUB, "a", T0)).unwrap();
        }
        let ids: Vec<_> = db.get_group_messages(HUB).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn missing_sender_profile_has_no_handle() {
        let db = db();
        db.insert_group_message(&text("m1", HUB, "ghost", T0)).unwrap();
        let rows = db.get_group_messages(HUB).unwrap();
        assert_eq!(rows[0].sender_username, None);
    }

    #[test]
    fn soft_delete_hides_only_the_senders_messages() {
        let db = db();
        let c = conversation(&db);
        db.insert_direct_message(&text("m1", &c, "a", T0)).unwrap();
        db.insert_direct_message(&text("m2", &c, "b", "2024-01-01T00:00:01.000000Z"))
            .unwrap();
        db.insert_direct_message(&text("m3", &c, "a", "2024-01-01T00:00:02.000000Z"))
            .unwrap();

        assert_eq!(db.soft_delete_direct_messages(&c, "a", "2024-01-02T00:00:00.000000Z").unwrap(), 2);
        let left: Vec<_> = db.get_direct_messages(&c).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(left, vec!["m2"]);

        // Already-deleted rows are not touched again
        assert_eq!(db.soft_delete_direct_messages(&c, "a", "2024-01-03T00:00:00.000000Z").unwrap(), 0);
    }

    #[test]
    fn direct_message_bumps_conversation_activity() {
        let db = db();
        let c = conversation(&db);
        db.insert_direct_message(&text("m1", &c, "a", "2024-05-05T00:00:00.000000Z")).unwrap();
        let listed = db.list_conversations_for("b").unwrap();
        assert_eq!(listed[0].updated_at, "2024-05-05T00:00:00.000000Z");
    }
}
