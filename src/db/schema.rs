//! SQL DDL for all journal tables.
//!
//! Defines `users`, `worlds`, `presence_logs`, `shared_events`, `event_participants`,
//! `event_groups`, `friend_edges`, the tag/comment/like side tables, and
//! `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for the journal's core tables.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS worlds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    world_name TEXT NOT NULL,
    external_id TEXT UNIQUE,
    tags TEXT
);

CREATE INDEX IF NOT EXISTS idx_worlds_name ON worlds(world_name);

-- Raw per-observer presence log
CREATE TABLE IF NOT EXISTS presence_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    timestamp TEXT NOT NULL,
    kind TEXT NOT NULL,
    world_name TEXT NOT NULL,
    world_external_id TEXT,
    access_tag TEXT,
    player_name TEXT NOT NULL,
    is_friend INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_presence_logs_user_ts ON presence_logs(user_id, timestamp);

CREATE TABLE IF NOT EXISTS event_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    anchor_event_id INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS shared_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    world_id INTEGER NOT NULL REFERENCES worlds(id),
    friend_name TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    duration INTEGER NOT NULL CHECK(duration >= 0),
    notes TEXT,
    event_group_id INTEGER REFERENCES event_groups(id),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_user ON shared_events(user_id);
CREATE INDEX IF NOT EXISTS idx_events_world_time ON shared_events(world_id, start_time, end_time);
CREATE INDEX IF NOT EXISTS idx_events_group ON shared_events(event_group_id);

CREATE TABLE IF NOT EXISTS event_participants (
    event_id INTEGER NOT NULL REFERENCES shared_events(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    PRIMARY KEY (event_id, user_id)
);

-- Symmetric friendship, stored as two directed rows
CREATE TABLE IF NOT EXISTS friend_edges (
    user_id INTEGER NOT NULL REFERENCES users(id),
    friend_id INTEGER NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, friend_id),
    CHECK(user_id <> friend_id)
);

CREATE INDEX IF NOT EXISTS idx_friend_edges_friend ON friend_edges(friend_id);

CREATE TABLE IF NOT EXISTS event_tags (
    event_id INTEGER NOT NULL REFERENCES shared_events(id),
    tag_name TEXT NOT NULL,
    PRIMARY KEY (event_id, tag_name)
);

CREATE TABLE IF NOT EXISTS event_comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES shared_events(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    parent_id INTEGER REFERENCES event_comments(id),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_event ON event_comments(event_id);

CREATE TABLE IF NOT EXISTS event_likes (
    event_id INTEGER NOT NULL REFERENCES shared_events(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (event_id, user_id)
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "worlds",
            "presence_logs",
            "shared_events",
            "event_participants",
            "event_groups",
            "friend_edges",
            "event_tags",
            "event_comments",
            "event_likes",
            "schema_meta",
        ] {
            assert!(tables.contains(&table.to_string()), "{table} table missing");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn friend_edges_reject_self_loops() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (username, created_at) VALUES ('alice', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO friend_edges (user_id, friend_id, created_at) VALUES (1, 1, '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err(), "self friendship should be rejected by CHECK constraint");
    }
}
