#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use rendezvous::db;
use rendezvous::journal::ingest;
use rendezvous::journal::types::{PresenceKind, PresenceLogEntry, User, WorldRef};
use rendezvous::journal::users;
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

/// 2024-05-01 at the given time.
pub fn ts(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// Reference date for pasted logs dated in May 2024.
pub fn reference() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 31)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn world_w() -> WorldRef {
    WorldRef::new("W", Some("#777".into()))
}

/// Register each name and return the users in the same order.
pub fn seed_users(conn: &Connection, names: &[&str]) -> Vec<User> {
    names
        .iter()
        .map(|name| users::register_user(conn, name).unwrap())
        .collect()
}

pub fn log_entry(
    observer: &User,
    kind: PresenceKind,
    subject: &str,
    at: NaiveDateTime,
    is_friend: bool,
) -> PresenceLogEntry {
    PresenceLogEntry {
        observer_id: observer.id,
        timestamp: at,
        kind,
        world: world_w(),
        access_tag: None,
        subject: subject.into(),
        is_friend,
    }
}

/// Store a log in which `observer` and `companion` spend [start, end] together
/// in world W.
pub fn log_session(
    conn: &Connection,
    observer: &User,
    companion: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    is_friend: bool,
) {
    let entries = vec![
        log_entry(observer, PresenceKind::LocationChange, &observer.username, start, false),
        log_entry(observer, PresenceKind::PlayerJoin, companion, start, is_friend),
        log_entry(observer, PresenceKind::PlayerLeave, companion, end, is_friend),
    ];
    ingest::append_entries(conn, &entries).unwrap();
}
