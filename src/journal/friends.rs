//! Friend edges between registered users.
//!
//! A friendship is stored as two directed rows. Writers always add both; readers
//! still check, and quietly restore a missing direction instead of surfacing it.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::journal::types::User;
use crate::journal::users;

/// Make `a` and `b` friends in both directions. Returns `true` when either
/// direction was missing. Self-edges are ignored.
///
/// Runs on the caller's connection or transaction.
pub fn ensure_symmetric_friend_edge(conn: &Connection, a: i64, b: i64) -> rusqlite::Result<bool> {
    if a == b {
        return Ok(false);
    }
    let now = chrono::Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO friend_edges (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
    )?;
    let written = stmt.execute(params![a, b, now])? + stmt.execute(params![b, a, now])?;
    Ok(written > 0)
}

/// Restore the missing direction of every one-sided edge touching `user_id`,
/// or of every edge when `user_id` is `None`. Returns the rows written.
pub fn repair_friend_edges(conn: &Connection, user_id: Option<i64>) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO friend_edges (user_id, friend_id, created_at) \
         SELECT f.friend_id, f.user_id, ?2 FROM friend_edges f \
         WHERE (?1 IS NULL OR f.user_id = ?1 OR f.friend_id = ?1) \
           AND NOT EXISTS (SELECT 1 FROM friend_edges r \
                           WHERE r.user_id = f.friend_id AND r.friend_id = f.user_id)",
        params![user_id, chrono::Utc::now().to_rfc3339()],
    )
}

/// A user's friends, ordered by name. Edges recorded in either direction count.
pub fn friends_of(conn: &Connection, user_id: i64) -> Result<Vec<User>> {
    let user = users::get_user(conn, user_id)?;

    let repaired = repair_friend_edges(conn, Some(user_id))?;
    if repaired > 0 {
        tracing::warn!(user = %user.username, repaired, "restored one-sided friend edges");
    }

    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.created_at FROM users u \
         WHERE u.id IN (SELECT friend_id FROM friend_edges WHERE user_id = ?1 \
                        UNION SELECT user_id FROM friend_edges WHERE friend_id = ?1) \
         ORDER BY u.username",
    )?;
    let friends = stmt
        .query_map(params![user_id], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(friends)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn names(users: &[User]) -> Vec<&str> {
        users.iter().map(|u| u.username.as_str()).collect()
    }

    #[test]
    fn edge_is_written_both_ways_once() {
        let conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        let bob = users::register_user(&conn, "bob").unwrap();

        assert!(ensure_symmetric_friend_edge(&conn, alice.id, bob.id).unwrap());
        assert!(!ensure_symmetric_friend_edge(&conn, bob.id, alice.id).unwrap());
        assert_eq!(names(&friends_of(&conn, alice.id).unwrap()), vec!["bob"]);
        assert_eq!(names(&friends_of(&conn, bob.id).unwrap()), vec!["alice"]);
    }

    #[test]
    fn self_edge_is_ignored() {
        let conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        assert!(!ensure_symmetric_friend_edge(&conn, alice.id, alice.id).unwrap());
        assert!(friends_of(&conn, alice.id).unwrap().is_empty());
    }

    #[test]
    fn one_sided_edge_is_repaired_on_read() {
        let conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        let bob = users::register_user(&conn, "bob").unwrap();
        conn.execute(
            "INSERT INTO friend_edges (user_id, friend_id, created_at) VALUES (?1, ?2, 'x')",
            params![alice.id, bob.id],
        )
        .unwrap();

        assert_eq!(names(&friends_of(&conn, bob.id).unwrap()), vec!["alice"]);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM friend_edges", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn friends_are_ordered_by_name() {
        let conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        let zed = users::register_user(&conn, "zed").unwrap();
        let bob = users::register_user(&conn, "bob").unwrap();
        ensure_symmetric_friend_edge(&conn, alice.id, zed.id).unwrap();
        ensure_symmetric_friend_edge(&conn, alice.id, bob.id).unwrap();
        assert_eq!(names(&friends_of(&conn, alice.id).unwrap()), vec!["bob", "zed"]);
    }
}
