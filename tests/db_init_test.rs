use rendezvous::db;
use rendezvous::db::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use tempfile::TempDir;

#[test]
fn open_database_bootstraps_a_new_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("journal.db");

    let conn = db::open_database(&path).unwrap();
    assert!(path.exists());
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);

    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
    let fk: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(fk, 1);
}

#[test]
fn reopening_keeps_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("journal.db");

    {
        let conn = db::open_database(&path).unwrap();
        rendezvous::journal::users::register_user(&conn, "alice").unwrap();
    }

    let conn = db::open_database(&path).unwrap();
    let users = rendezvous::journal::users::list_users(&conn).unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "alice");
}

#[test]
fn health_report_on_fresh_database() {
    let conn = db::open_memory_database().unwrap();
    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(report.event_count, 0);
    assert_eq!(report.asymmetric_friend_edges, 0);
}

#[test]
fn health_report_flags_one_sided_friend_edges() {
    let conn = db::open_memory_database().unwrap();
    let alice = rendezvous::journal::users::register_user(&conn, "alice").unwrap();
    let bob = rendezvous::journal::users::register_user(&conn, "bob").unwrap();
    conn.execute(
        "INSERT INTO friend_edges (user_id, friend_id, created_at) VALUES (?1, ?2, 'x')",
        rusqlite::params![alice.id, bob.id],
    )
    .unwrap();

    let report = db::check_database_health(&conn).unwrap();
    assert_eq!(report.friend_edge_count, 1);
    assert_eq!(report.asymmetric_friend_edges, 1);
}
