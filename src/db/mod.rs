pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Open (or create) the journal database at the given path with the schema
/// bootstrapped and all migrations applied.
///
/// This is the one place schema creation happens; request handlers never
/// initialize tables lazily.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open a migrated in-memory database.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub schema_version: u32,
    pub user_count: u64,
    pub log_count: u64,
    pub event_count: u64,
    pub group_count: u64,
    pub ungrouped_event_count: u64,
    pub friend_edge_count: u64,
    /// Directed friend rows whose reverse row is missing.
    pub asymmetric_friend_edges: u64,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Row counts, symmetry check on friend edges, and `PRAGMA integrity_check`.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };

    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

    Ok(HealthReport {
        schema_version: migrations::get_schema_version(conn)?,
        user_count: count("SELECT COUNT(*) FROM users")?,
        log_count: count("SELECT COUNT(*) FROM presence_logs")?,
        event_count: count("SELECT COUNT(*) FROM shared_events")?,
        group_count: count("SELECT COUNT(*) FROM event_groups")?,
        ungrouped_event_count: count(
            "SELECT COUNT(*) FROM shared_events WHERE event_group_id IS NULL",
        )?,
        friend_edge_count: count("SELECT COUNT(*) FROM friend_edges")?,
        asymmetric_friend_edges: count(
            "SELECT COUNT(*) FROM friend_edges f WHERE NOT EXISTS ( \
                 SELECT 1 FROM friend_edges r \
                 WHERE r.user_id = f.friend_id AND r.friend_id = f.user_id)",
        )?,
        integrity_ok: integrity_details == "ok",
        integrity_details,
    })
}
