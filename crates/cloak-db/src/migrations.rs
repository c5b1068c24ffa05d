use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password        TEXT NOT NULL,
                is_suspended    INTEGER NOT NULL DEFAULT 0,
                suspend_reason  TEXT,
                suspended_at    TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE user_roles (
                user_id     TEXT NOT NULL REFERENCES users(id),
                role        TEXT NOT NULL,
                PRIMARY KEY (user_id, role)
            );

            CREATE TABLE chat_groups (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                description TEXT,
                type        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE group_members (
                group_id    TEXT NOT NULL REFERENCES chat_groups(id),
                user_id     TEXT NOT NULL,
                joined_at   TEXT NOT NULL,
                PRIMARY KEY (group_id, user_id)
            );

            CREATE INDEX idx_group_members_user ON group_members(user_id);

            CREATE TABLE conversations (
                id          TEXT PRIMARY KEY,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE conversation_participants (
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                user_id         TEXT NOT NULL,
                joined_at       TEXT NOT NULL,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX idx_participants_user ON conversation_participants(user_id);

            -- seq is the insertion-order tiebreak for equal created_at values
            CREATE TABLE messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                group_id        TEXT NOT NULL REFERENCES chat_groups(id),
                sender_id       TEXT NOT NULL,
                content         TEXT NOT NULL,
                attachment_url  TEXT,
                attachment_kind TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_group ON messages(group_id, created_at, seq);

            CREATE TABLE direct_messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id       TEXT NOT NULL,
                content         TEXT NOT NULL,
                attachment_url  TEXT,
                attachment_kind TEXT,
                created_at      TEXT NOT NULL,
                deleted_at      TEXT
            );

            CREATE INDEX idx_direct_messages_conversation
                ON direct_messages(conversation_id, created_at, seq);

            CREATE TABLE statuses (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                expires_at  TEXT NOT NULL
            );

            CREATE INDEX idx_statuses_expiry ON statuses(expires_at);

            CREATE TABLE reports (
                id                  TEXT PRIMARY KEY,
                reporter_id         TEXT NOT NULL,
                reported_user_id    TEXT NOT NULL REFERENCES users(id),
                reason              TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                UNIQUE(reporter_id, reported_user_id)
            );

            CREATE INDEX idx_reports_reported ON reports(reported_user_id);

            CREATE TABLE appeals (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                message     TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                reviewed_by TEXT,
                reviewed_at TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_appeals_user ON appeals(user_id, status);

            CREATE TABLE blocked_users (
                blocker_id  TEXT NOT NULL,
                blocked_id  TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (blocker_id, blocked_id)
            );

            -- Seed the group catalog
            INSERT INTO chat_groups (id, name, description, type, created_at) VALUES
                ('00000000-0000-0000-0000-000000000101', '100lvl Hub',
                    'First-year students', 'level', '2024-01-01T00:00:00.000000Z'),
                ('00000000-0000-0000-0000-000000000102', '200lvl Community',
                    'Second-year students', 'level', '2024-01-01T00:00:00.000000Z'),
                ('00000000-0000-0000-0000-000000000103', '300lvl Discussion',
                    'Third-year students', 'level', '2024-01-01T00:00:00.000000Z'),
                ('00000000-0000-0000-0000-000000000104', '400lvl Discussion',
                    'Final-year students', 'level', '2024-01-01T00:00:00.000000Z'),
                ('00000000-0000-0000-0000-000000000201', 'Tech Enthusiasts',
                    'Code, gadgets and side projects', 'interest', '2024-01-01T00:00:00.000000Z'),
                ('00000000-0000-0000-0000-000000000202', 'Gaming Community',
                    'Find a squad', 'interest', '2024-01-01T00:00:00.000000Z');

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_rerunnable() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let groups: i64 = conn
            .query_row("SELECT COUNT(*) FROM chat_groups", [], |r| r.get(0))
            .unwrap();
        assert_eq!(groups, 6);
    }
}
