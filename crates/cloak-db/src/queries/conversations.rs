use anyhow::Result;
use rusqlite::TransactionBehavior;

use crate::Database;
use crate::models::ConversationRow;

/// Outcome of resolving a two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Existing(String),
    Created(String),
}

impl Resolution {
    pub fn id(&self) -> &str {
        match self {
            Resolution::Existing(id) | Resolution::Created(id) => id,
        }
    }
}

impl Database {
    /// Find the conversation whose participant set is exactly {a, b}, or
    /// create it with both participant rows.
    ///
    /// Enumerate-then-create runs inside one IMMEDIATE transaction, so two
    /// resolutions for the same pair cannot both take the create branch.
    pub fn resolve_conversation(
        &self,
        user_a: &str,
        user_b: &str,
        new_id: &str,
        now: &str,
    ) -> Result<Resolution> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let candidates: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT conversation_id FROM conversation_participants WHERE user_id = ?1",
                )?;
                stmt.query_map([user_a], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            for conversation_id in candidates {
                let members: Vec<String> = {
                    let mut stmt = tx.prepare(
                        "SELECT user_id FROM conversation_participants WHERE conversation_id = ?1",
                    )?;
                    stmt.query_map([&conversation_id], |row| row.get(0))?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                };
                if is_exact_pair(&members, user_a, user_b) {
                    return Ok(Resolution::Existing(conversation_id));
                }
            }

            tx.execute(
                "INSERT INTO conversations (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                (new_id, now),
            )?;
            for user_id in [user_a, user_b] {
                tx.execute(
                    "INSERT INTO conversation_participants (conversation_id, user_id, joined_at)
                     VALUES (?1, ?2, ?3)",
                    (new_id, user_id, now),
                )?;
            }
            tx.commit()?;

            Ok(Resolution::Created(new_id.to_string()))
        })
    }

    pub fn conversation_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conversations WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn is_conversation_member(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conversation_participants
                 WHERE conversation_id = ?1 AND user_id = ?2",
                (conversation_id, user_id),
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn get_participants(&self, conversation_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM conversation_participants
                 WHERE conversation_id = ?1 ORDER BY joined_at, user_id",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    /// The user's conversations with the counterpart's handle, most recently
    /// active first.
    pub fn list_conversations_for(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, other.user_id, u.username, c.created_at, c.updated_at
                 FROM conversation_participants me
                 JOIN conversations c ON c.id = me.conversation_id
                 JOIN conversation_participants other
                    ON other.conversation_id = c.id AND other.user_id != me.user_id
                 LEFT JOIN users u ON u.id = other.user_id
                 WHERE me.user_id = ?1
                 ORDER BY c.updated_at DESC, c.id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        other_user_id: row.get(1)?,
                        other_username: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn is_exact_pair(members: &[String], a: &str, b: &str) -> bool {
    members.len() == 2 && members.iter().any(|m| m == a) && members.iter().any(|m| m == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db, user};

    #[test]
    fn second_resolution_finds_the_first() {
        let db = db();
        let a = user(&db, "a", "alice");
        let b = user(&db, "b", "bob");

        let first = db.resolve_conversation(&a, &b, "c1", "2024-01-01T00:00:00.000000Z").unwrap();
        assert_eq!(first, Resolution::Created("c1".into()));

        // Either direction resolves to the same row
        let again = db.resolve_conversation(&b, &a, "c2", "2024-01-01T00:00:01.000000Z").unwrap();
        assert_eq!(again, Resolution::Existing("c1".into()));
        assert!(!db.conversation_exists("c2").unwrap());
    }

    #[test]
    fn distinct_pairs_get_distinct_conversations() {
        let db = db();
        let a = user(&db, "a", "alice");
        let b = user(&db, "b", "bob");
        let c = user(&db, "c", "carol");

        db.resolve_conversation(&a, &b, "ab", "2024-01-01T00:00:00.000000Z").unwrap();
        let ac = db.resolve_conversation(&a, &c, "ac", "2024-01-01T00:00:01.000000Z").unwrap();
        assert_eq!(ac, Resolution::Created("ac".into()));

        assert!(db.is_conversation_member("ab", "b").unwrap());
        assert!(!db.is_conversation_member("ab", "c").unwrap());

        let listed = db.list_conversations_for(&a).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "ac");
        assert_eq!(listed[0].other_username.as_deref(), Some("carol"));
    }

    #[test]
    fn exact_pair_rejects_supersets() {
        let members = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(!is_exact_pair(&members, "a", "b"));
        assert!(is_exact_pair(&members[..2], "b", "a"));
    }
}
