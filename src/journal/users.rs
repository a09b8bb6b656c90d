//! Registered users and the worlds they visit.
//!
//! Authentication lives outside the journal; a user here is just a unique name
//! that presence-log subjects can be resolved against.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use crate::error::{JournalError, Result};
use crate::journal::types::{User, WorldRef};

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: row.get(2)?,
    })
}

/// Register a new user. Fails if the name is empty or already taken.
pub fn register_user(conn: &Connection, username: &str) -> Result<User> {
    let username = username.trim();
    if username.is_empty() {
        return Err(JournalError::InvalidUsername(username.to_string()));
    }
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
        params![username, now],
    )?;
    Ok(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        created_at: now,
    })
}

/// Return the user with this name, registering it first if needed.
pub fn get_or_create_user(conn: &Connection, username: &str) -> Result<User> {
    match find_user_by_name(conn, username)? {
        Some(user) => Ok(user),
        None => register_user(conn, username),
    }
}

pub fn find_user_by_name(conn: &Connection, username: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, created_at FROM users WHERE username = ?1",
            params![username.trim()],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<User> {
    conn.query_row(
        "SELECT id, username, created_at FROM users WHERE id = ?1",
        params![user_id],
        row_to_user,
    )
    .optional()?
    .ok_or_else(|| JournalError::UserNotFound(user_id.to_string()))
}

/// Look up by name and fail with [`JournalError::UserNotFound`] if absent.
pub fn require_user(conn: &Connection, username: &str) -> Result<User> {
    find_user_by_name(conn, username)?
        .ok_or_else(|| JournalError::UserNotFound(username.to_string()))
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT id, username, created_at FROM users ORDER BY username")?;
    let users = stmt
        .query_map([], row_to_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Username → id for resolving log subjects to registered users.
pub fn user_directory(conn: &Connection) -> Result<HashMap<String, i64>> {
    let mut stmt = conn.prepare("SELECT username, id FROM users")?;
    let directory = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<HashMap<_, _>, _>>()?;
    Ok(directory)
}

/// Find or insert a world row. The external id is the identity when present,
/// the name otherwise.
pub fn get_or_create_world(conn: &Connection, world: &WorldRef) -> rusqlite::Result<i64> {
    let existing: Option<i64> = match &world.external_id {
        Some(external_id) => conn
            .query_row(
                "SELECT id FROM worlds WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT id FROM worlds WHERE world_name = ?1 AND external_id IS NULL",
                params![world.name],
                |row| row.get(0),
            )
            .optional()?,
    };

    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO worlds (world_name, external_id, tags) VALUES (?1, ?2, '')",
        params![world.name, world.external_id],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn register_and_find() {
        let conn = db::open_memory_database().unwrap();
        let alice = register_user(&conn, " alice ").unwrap();
        assert_eq!(alice.username, "alice");

        let found = find_user_by_name(&conn, "alice").unwrap().unwrap();
        assert_eq!(found.id, alice.id);
        assert!(find_user_by_name(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let conn = db::open_memory_database().unwrap();
        register_user(&conn, "alice").unwrap();
        assert!(register_user(&conn, "alice").is_err());
    }

    #[test]
    fn get_or_create_user_is_idempotent() {
        let conn = db::open_memory_database().unwrap();
        let first = get_or_create_user(&conn, "bob").unwrap();
        let second = get_or_create_user(&conn, "bob").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(list_users(&conn).unwrap().len(), 1);
    }

    #[test]
    fn worlds_dedup_on_external_id_then_name() {
        let conn = db::open_memory_database().unwrap();
        let a = get_or_create_world(&conn, &WorldRef::new("Murder 4", Some("#34567".into()))).unwrap();
        let b = get_or_create_world(&conn, &WorldRef::new("Murder 4 (renamed)", Some("#34567".into()))).unwrap();
        let c = get_or_create_world(&conn, &WorldRef::new("Murder 4", None)).unwrap();
        let d = get_or_create_world(&conn, &WorldRef::new("Murder 4", None)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(c, d);
    }

    #[test]
    fn get_user_reports_missing() {
        let conn = db::open_memory_database().unwrap();
        assert!(matches!(get_user(&conn, 99), Err(JournalError::UserNotFound(_))));
    }
}
