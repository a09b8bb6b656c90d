//! Log store: persisting and loading per-observer presence logs.
//!
//! [`import_log_text`] is the bulk entry point for pasted client text. It parses,
//! orders the records chronologically, attributes joins and leaves to the world of
//! the preceding location change, and writes everything in one transaction.
//! Re-importing the same text is a no-op thanks to the dedup index.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use crate::error::{JournalError, Result};
use crate::journal::logparse::{parse_log_text, ParseIssue, ParsedRecord};
use crate::journal::types::{
    format_ts, parse_ts, Observer, PresenceKind, PresenceLogEntry, WorldRef,
};
use crate::journal::users;

/// Result returned from a bulk import.
#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub success: bool,
    /// Entries newly written to the log store.
    pub imported_count: usize,
    /// Lines or records that could not be parsed.
    pub skipped_count: usize,
    /// Entries already present from an earlier import.
    pub duplicate_count: usize,
    pub issues: Vec<ParseIssue>,
}

/// An observer's stored log, ready for reconstruction.
#[derive(Debug)]
pub struct ObserverLog {
    pub entries: Vec<PresenceLogEntry>,
    /// Stored rows dropped for a malformed timestamp or unknown kind.
    pub skipped: usize,
}

/// Parse pasted client text and append it to the user's log.
pub fn import_log_text(
    conn: &mut Connection,
    user_id: i64,
    text: &str,
    reference: NaiveDateTime,
) -> Result<ImportResult> {
    let user = users::get_user(conn, user_id)?;
    let observer = Observer::from(&user);

    let report = parse_log_text(text, reference);
    let first_at = report.records.iter().map(|r| r.timestamp).min();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let (imported, duplicates) = (|| -> rusqlite::Result<(usize, usize)> {
        // A paste cut below its location line continues the world already on record.
        let initial_world = match first_at {
            Some(at) => world_at(&tx, user_id, at)?,
            None => None,
        };
        let entries = records_to_entries(&observer, report.records, initial_world);
        append_entries(&tx, &entries)
    })()
    .map_err(|e| JournalError::rolled_back("log import", e))?;
    tx.commit()
        .map_err(|e| JournalError::rolled_back("log import", e))?;

    tracing::info!(
        user = %observer.username,
        imported,
        duplicates,
        skipped = report.issues.len(),
        "presence log imported"
    );

    Ok(ImportResult {
        success: true,
        imported_count: imported,
        skipped_count: report.issues.len(),
        duplicate_count: duplicates,
        issues: report.issues,
    })
}

/// Turn parsed records into ordered log entries for `observer`.
///
/// Clients paste newest-first, so a descending record list is reversed before a
/// stable sort; records sharing a minute then keep their real order. Joins and
/// leaves inherit the world of the latest location change before them, or
/// `initial_world` when the text has none ahead of them.
pub fn records_to_entries(
    observer: &Observer,
    mut records: Vec<ParsedRecord>,
    initial_world: Option<WorldRef>,
) -> Vec<PresenceLogEntry> {
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        if first.timestamp > last.timestamp {
            records.reverse();
        }
    }
    records.sort_by_key(|r| r.timestamp);

    let mut current_world = initial_world.unwrap_or_else(WorldRef::unknown);
    let mut entries = Vec::with_capacity(records.len());

    for record in records {
        let subject = match record.kind {
            PresenceKind::LocationChange => {
                if let Some(world) = record.world {
                    current_world = world;
                }
                observer.username.clone()
            }
            PresenceKind::PlayerJoin | PresenceKind::PlayerLeave => {
                match record.player_name {
                    Some(name) => name,
                    None => continue,
                }
            }
        };

        entries.push(PresenceLogEntry {
            observer_id: observer.id,
            timestamp: record.timestamp,
            kind: record.kind,
            world: current_world.clone(),
            access_tag: record.access_tag,
            subject,
            is_friend: record.is_friend,
        });
    }

    entries
}

/// The world of the observer's latest stored location change at or before `at`.
pub fn world_at(
    conn: &Connection,
    user_id: i64,
    at: NaiveDateTime,
) -> rusqlite::Result<Option<WorldRef>> {
    conn.query_row(
        "SELECT world_name, world_external_id FROM presence_logs \
         WHERE user_id = ?1 AND kind = ?2 AND timestamp <= ?3 \
         ORDER BY timestamp DESC, id DESC LIMIT 1",
        params![user_id, PresenceKind::LocationChange.as_str(), format_ts(&at)],
        |row| Ok(WorldRef::new(row.get::<_, String>(0)?, row.get(1)?)),
    )
    .optional()
}

/// Append structured entries. Returns `(inserted, duplicates)`.
///
/// Runs on whatever connection or transaction the caller passes.
pub fn append_entries(
    conn: &Connection,
    entries: &[PresenceLogEntry],
) -> rusqlite::Result<(usize, usize)> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO presence_logs \
         (user_id, timestamp, kind, world_name, world_external_id, access_tag, player_name, is_friend, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;

    let mut inserted = 0;
    let mut duplicates = 0;
    for entry in entries {
        let changed = stmt.execute(params![
            entry.observer_id,
            format_ts(&entry.timestamp),
            entry.kind.as_str(),
            entry.world.name,
            entry.world.external_id,
            entry.access_tag,
            entry.subject,
            entry.is_friend,
            now,
        ])?;
        if changed == 0 {
            duplicates += 1;
        } else {
            inserted += 1;
        }
    }

    Ok((inserted, duplicates))
}

/// Load a user's log in chronological order, skipping unreadable rows.
pub fn load_observer_log(conn: &Connection, user_id: i64) -> Result<ObserverLog> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, kind, world_name, world_external_id, access_tag, player_name, is_friend \
         FROM presence_logs WHERE user_id = ?1 ORDER BY timestamp, id",
    )?;

    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, bool>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut entries = Vec::with_capacity(rows.len());
    let mut skipped = 0;

    for (ts, kind, world_name, external_id, access_tag, subject, is_friend) in rows {
        let (Some(timestamp), Ok(kind)) = (parse_ts(&ts), kind.parse::<PresenceKind>()) else {
            tracing::debug!(user_id, timestamp = %ts, kind = %kind, "skipping unreadable log row");
            skipped += 1;
            continue;
        };
        entries.push(PresenceLogEntry {
            observer_id: user_id,
            timestamp,
            kind,
            world: WorldRef::new(world_name, external_id),
            access_tag,
            subject,
            is_friend,
        });
    }

    Ok(ObserverLog { entries, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::NaiveDate;

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 30)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    const PASTED: &str = "\
12/28 01:53
 位置变动
 メゾン荘 201号室 #53949 friends+
12/28 00:52
 玩家加入
 💚
 Nagikokoro
12/28 00:40
 位置变动
 The Black Cat #12345
";

    #[test]
    fn import_orders_and_attributes_worlds() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();

        let result = import_log_text(&mut conn, alice.id, PASTED, reference()).unwrap();
        assert!(result.success);
        assert_eq!(result.imported_count, 3);
        assert_eq!(result.skipped_count, 0);

        let log = load_observer_log(&conn, alice.id).unwrap();
        assert_eq!(log.skipped, 0);
        let kinds: Vec<PresenceKind> = log.entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PresenceKind::LocationChange,
                PresenceKind::PlayerJoin,
                PresenceKind::LocationChange
            ]
        );
        // The join happened in the world entered at 00:40.
        assert_eq!(log.entries[1].world.key(), "#12345");
        assert_eq!(log.entries[0].subject, "alice");
        assert!(log.entries[1].is_friend);
    }

    #[test]
    fn reimport_is_counted_as_duplicates() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();

        import_log_text(&mut conn, alice.id, PASTED, reference()).unwrap();
        let second = import_log_text(&mut conn, alice.id, PASTED, reference()).unwrap();

        assert_eq!(second.imported_count, 0);
        assert_eq!(second.duplicate_count, 3);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM presence_logs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn joins_before_any_location_use_unknown_world() {
        let observer = Observer {
            id: 1,
            username: "alice".into(),
        };
        let report = parse_log_text("05/01 10:00 join bob\n", reference());
        let entries = records_to_entries(&observer, report.records, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].world, WorldRef::unknown());
    }

    #[test]
    fn paste_without_location_continues_stored_world() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        import_log_text(&mut conn, alice.id, PASTED, reference()).unwrap();

        let tail = "12/28 01:00\n 玩家离开\n 💚\n Nagikokoro\n";
        let result = import_log_text(&mut conn, alice.id, tail, reference()).unwrap();
        assert_eq!(result.imported_count, 1);

        let log = load_observer_log(&conn, alice.id).unwrap();
        let leave = log
            .entries
            .iter()
            .find(|e| e.kind == PresenceKind::PlayerLeave)
            .unwrap();
        assert_eq!(leave.world.key(), "#12345");
    }

    #[test]
    fn load_skips_rows_with_bad_timestamps() {
        let conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        conn.execute(
            "INSERT INTO presence_logs (user_id, timestamp, kind, world_name, player_name, created_at) \
             VALUES (?1, 'yesterday-ish', 'player_join', 'Lobby', 'bob', '2024-01-01T00:00:00Z')",
            params![alice.id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO presence_logs (user_id, timestamp, kind, world_name, player_name, created_at) \
             VALUES (?1, '2024-05-01T10:00:00', 'wave', 'Lobby', 'bob', '2024-01-01T00:00:00Z')",
            params![alice.id],
        )
        .unwrap();

        let log = load_observer_log(&conn, alice.id).unwrap();
        assert!(log.entries.is_empty());
        assert_eq!(log.skipped, 2);
    }

    #[test]
    fn import_for_unknown_user_fails() {
        let mut conn = db::open_memory_database().unwrap();
        let err = import_log_text(&mut conn, 42, PASTED, reference()).unwrap_err();
        assert!(err.is_not_found());
    }
}
