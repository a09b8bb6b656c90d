//! Event store: shared events plus their tags, comments and likes.
//!
//! Comments and likes are attached to one event row but read across its whole
//! event group, so every participant of an occasion sees the same thread.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{JournalError, Result};
use crate::journal::grouping;
use crate::journal::types::{
    format_ts, parse_ts, Observer, SharedEvent, SharedEventCandidate, WorldRef,
};
use crate::journal::users;

const EVENT_SELECT: &str = "SELECT e.id, e.user_id, u.username, e.world_id, w.world_name, w.external_id, \
     e.friend_name, e.start_time, e.end_time, e.duration, e.notes, e.event_group_id \
     FROM shared_events e \
     JOIN users u ON u.id = e.user_id \
     JOIN worlds w ON w.id = e.world_id";

const PARTICIPANT_SELECT: &str = "SELECT p.event_id, p.user_id, pu.username \
     FROM event_participants p \
     JOIN users pu ON pu.id = p.user_id \
     JOIN shared_events e ON e.id = p.event_id";

/// A manually entered event.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub world: WorldRef,
    pub companion_name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub username: String,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

/// Insert reconstructed candidates with their participants. Returns the new ids
/// in input order.
///
/// Runs on the caller's connection or transaction and leaves `event_group_id`
/// unset; grouping assigns it.
pub fn insert_candidates(
    conn: &Connection,
    candidates: &[SharedEventCandidate],
) -> rusqlite::Result<Vec<i64>> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut insert_event = conn.prepare(
        "INSERT INTO shared_events (user_id, world_id, friend_name, start_time, end_time, duration, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut insert_participant = conn.prepare(
        "INSERT OR IGNORE INTO event_participants (event_id, user_id) VALUES (?1, ?2)",
    )?;

    let mut ids = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let world_id = users::get_or_create_world(conn, &candidate.world)?;
        insert_event.execute(params![
            candidate.owner_id,
            world_id,
            candidate.companion_name,
            format_ts(&candidate.start),
            format_ts(&candidate.end),
            candidate.duration_secs.max(0),
            now,
        ])?;
        let event_id = conn.last_insert_rowid();
        for user_id in &candidate.participants {
            insert_participant.execute(params![event_id, user_id])?;
        }
        ids.push(event_id);
    }
    Ok(ids)
}

/// Record an event by hand. The event joins an existing group through the
/// windowed lookup, or gets a group of its own; the next full regroup is
/// authoritative either way.
pub fn create_manual_event(
    conn: &mut Connection,
    owner_id: i64,
    new: &NewEvent,
    window_minutes: i64,
) -> Result<SharedEvent> {
    let owner = users::get_user(conn, owner_id)?;

    if new.end < new.start {
        return Err(JournalError::InvalidEvent(format!(
            "end {} is before start {}",
            format_ts(&new.end),
            format_ts(&new.start)
        )));
    }
    if new.companion_name.trim().is_empty() {
        return Err(JournalError::InvalidEvent("companion name is empty".into()));
    }

    let mut candidate = SharedEventCandidate::new(
        &Observer::from(&owner),
        new.world.clone(),
        &new.companion_name,
        new.start,
        new.end,
        false,
    );
    if let Some(companion) = users::find_user_by_name(conn, &candidate.companion_name)? {
        candidate.participants.insert(companion.id);
    }

    let tx = conn.transaction()?;
    let event_id = (|| -> rusqlite::Result<i64> {
        let ids = insert_candidates(&tx, std::slice::from_ref(&candidate))?;
        let event_id = ids[0];
        if let Some(notes) = &new.notes {
            tx.execute(
                "UPDATE shared_events SET notes = ?1 WHERE id = ?2",
                params![notes, event_id],
            )?;
        }
        grouping::attach_to_group(&tx, event_id, window_minutes)?;
        Ok(event_id)
    })()
    .map_err(|e| JournalError::rolled_back("manual event", e))?;
    tx.commit()
        .map_err(|e| JournalError::rolled_back("manual event", e))?;

    tracing::info!(event_id, owner = %owner.username, "manual event created");
    get_event(conn, event_id)
}

pub fn update_event_notes(conn: &Connection, event_id: i64, notes: Option<&str>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE shared_events SET notes = ?1 WHERE id = ?2",
        params![notes, event_id],
    )?;
    if changed == 0 {
        return Err(JournalError::EventNotFound(event_id));
    }
    Ok(())
}

/// Delete an event with its participants, tags, comments and likes. A group
/// left without members is removed as well.
pub fn delete_event(conn: &mut Connection, event_id: i64) -> Result<()> {
    let group_id: Option<i64> = conn
        .query_row(
            "SELECT event_group_id FROM shared_events WHERE id = ?1",
            params![event_id],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()?
        .ok_or(JournalError::EventNotFound(event_id))?;

    let tx = conn.transaction()?;
    (|| -> rusqlite::Result<()> {
        tx.execute("DELETE FROM event_likes WHERE event_id = ?1", params![event_id])?;
        tx.execute("DELETE FROM event_tags WHERE event_id = ?1", params![event_id])?;
        // Replies posted on sibling events survive as top-level comments.
        tx.execute(
            "UPDATE event_comments SET parent_id = NULL \
             WHERE event_id <> ?1 \
               AND parent_id IN (SELECT id FROM event_comments WHERE event_id = ?1)",
            params![event_id],
        )?;
        tx.execute("DELETE FROM event_comments WHERE event_id = ?1", params![event_id])?;
        tx.execute(
            "DELETE FROM event_participants WHERE event_id = ?1",
            params![event_id],
        )?;
        tx.execute("DELETE FROM shared_events WHERE id = ?1", params![event_id])?;
        if let Some(group_id) = group_id {
            tx.execute(
                "DELETE FROM event_groups WHERE id = ?1 \
                 AND NOT EXISTS (SELECT 1 FROM shared_events WHERE event_group_id = ?1)",
                params![group_id],
            )?;
        }
        Ok(())
    })()
    .map_err(|e| JournalError::rolled_back("event delete", e))?;
    tx.commit()
        .map_err(|e| JournalError::rolled_back("event delete", e))?;

    tracing::debug!(event_id, "event deleted");
    Ok(())
}

pub fn get_event(conn: &Connection, event_id: i64) -> Result<SharedEvent> {
    query_events(conn, "WHERE e.id = ?1", &[&event_id])?
        .into_iter()
        .next()
        .ok_or(JournalError::EventNotFound(event_id))
}

/// Events owned by one user, oldest first.
pub fn list_events_for_user(conn: &Connection, user_id: i64) -> Result<Vec<SharedEvent>> {
    query_events(conn, "WHERE e.user_id = ?1", &[&user_id])
}

/// Members of one event group.
pub fn list_events_in_group(conn: &Connection, group_id: i64) -> Result<Vec<SharedEvent>> {
    query_events(conn, "WHERE e.event_group_id = ?1", &[&group_id])
}

/// Every stored event.
pub fn load_all_events(conn: &Connection) -> Result<Vec<SharedEvent>> {
    query_events(conn, "", &[])
}

/// Load events matching `filter` (a WHERE clause over alias `e`) with their
/// participants. Rows with unreadable timestamps are skipped with a warning.
fn query_events(conn: &Connection, filter: &str, args: &[&dyn ToSql]) -> Result<Vec<SharedEvent>> {
    let sql = format!("{EVENT_SELECT} {filter} ORDER BY e.start_time, e.id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(args, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, i64>(9)?,
                row.get::<_, Option<String>>(10)?,
                row.get::<_, Option<i64>>(11)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let sql = format!("{PARTICIPANT_SELECT} {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let mut participants: HashMap<i64, (BTreeSet<i64>, BTreeSet<String>)> = HashMap::new();
    let participant_rows = stmt.query_map(args, |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in participant_rows {
        let (event_id, user_id, username) = row?;
        let entry = participants.entry(event_id).or_default();
        entry.0.insert(user_id);
        entry.1.insert(username);
    }

    let mut events = Vec::with_capacity(rows.len());
    for (id, owner_id, owner_name, world_id, world_name, external_id, companion, start, end, duration, notes, group) in rows {
        let (Some(start), Some(end)) = (parse_ts(&start), parse_ts(&end)) else {
            tracing::warn!(event_id = id, "skipping event with unreadable timestamps");
            continue;
        };
        let (participant_ids, participant_names) = participants.remove(&id).unwrap_or_default();
        events.push(SharedEvent {
            id,
            owner_id,
            owner_name,
            world_id,
            world: WorldRef::new(world_name, external_id),
            companion_name: companion,
            start,
            end,
            duration_secs: duration,
            notes,
            participants: participant_ids,
            participant_names,
            event_group_id: group,
        });
    }
    Ok(events)
}

fn require_event(conn: &Connection, event_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM shared_events WHERE id = ?1)",
        params![event_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(JournalError::EventNotFound(event_id));
    }
    Ok(())
}

/// Ids of every event in the same group as `event_id`, the event included.
/// An ungrouped event is its own group.
pub fn group_event_ids(conn: &Connection, event_id: i64) -> Result<Vec<i64>> {
    require_event(conn, event_id)?;
    let mut stmt = conn.prepare(
        "SELECT id FROM shared_events \
         WHERE id = ?1 \
            OR (event_group_id IS NOT NULL \
                AND event_group_id = (SELECT event_group_id FROM shared_events WHERE id = ?1)) \
         ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![event_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

// ── Tags ───────────────────────────────────────────────────────────────

/// Returns `false` when the event already carried the tag.
pub fn add_tag(conn: &Connection, event_id: i64, tag: &str) -> Result<bool> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(JournalError::InvalidEvent("tag is empty".into()));
    }
    require_event(conn, event_id)?;
    let changed = conn.execute(
        "INSERT OR IGNORE INTO event_tags (event_id, tag_name) VALUES (?1, ?2)",
        params![event_id, tag],
    )?;
    Ok(changed > 0)
}

pub fn remove_tag(conn: &Connection, event_id: i64, tag: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM event_tags WHERE event_id = ?1 AND tag_name = ?2",
        params![event_id, tag.trim()],
    )?;
    Ok(changed > 0)
}

pub fn tags_for_event(conn: &Connection, event_id: i64) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT tag_name FROM event_tags WHERE event_id = ?1 ORDER BY tag_name")?;
    let tags = stmt
        .query_map(params![event_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(tags)
}

/// Every tag in use with the number of events carrying it, most used first.
pub fn all_tags(conn: &Connection) -> Result<Vec<TagCount>> {
    let mut stmt = conn.prepare(
        "SELECT tag_name, COUNT(*) FROM event_tags GROUP BY tag_name ORDER BY COUNT(*) DESC, tag_name",
    )?;
    let tags = stmt
        .query_map([], |row| {
            Ok(TagCount {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

// ── Comments ───────────────────────────────────────────────────────────

fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        event_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        parent_id: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Comment on an event. A reply's parent must sit on an event of the same group.
pub fn add_comment(
    conn: &Connection,
    event_id: i64,
    user_id: i64,
    content: &str,
    parent_id: Option<i64>,
) -> Result<Comment> {
    let content = content.trim();
    if content.is_empty() {
        return Err(JournalError::InvalidEvent("comment is empty".into()));
    }
    let user = users::get_user(conn, user_id)?;
    let group = group_event_ids(conn, event_id)?;

    if let Some(parent_id) = parent_id {
        let parent_event: Option<i64> = conn
            .query_row(
                "SELECT event_id FROM event_comments WHERE id = ?1",
                params![parent_id],
                |row| row.get(0),
            )
            .optional()?;
        match parent_event {
            Some(parent_event) if group.contains(&parent_event) => {}
            Some(_) => {
                return Err(JournalError::InvalidEvent(format!(
                    "comment {parent_id} belongs to another occasion"
                )))
            }
            None => {
                return Err(JournalError::InvalidEvent(format!(
                    "parent comment {parent_id} does not exist"
                )))
            }
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO event_comments (event_id, user_id, parent_id, content, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![event_id, user_id, parent_id, content, now],
    )?;

    Ok(Comment {
        id: conn.last_insert_rowid(),
        event_id,
        user_id,
        username: user.username,
        parent_id,
        content: content.to_string(),
        created_at: now,
    })
}

/// Every comment posted on any event of the group, oldest first.
pub fn group_comments(conn: &Connection, event_id: i64) -> Result<Vec<Comment>> {
    let group = group_event_ids(conn, event_id)?;
    let mut stmt = conn.prepare(
        "SELECT c.id, c.event_id, c.user_id, u.username, c.parent_id, c.content, c.created_at \
         FROM event_comments c JOIN users u ON u.id = c.user_id \
         WHERE c.event_id = ?1 ORDER BY c.created_at, c.id",
    )?;
    let mut comments = Vec::new();
    for id in group {
        let rows = stmt
            .query_map(params![id], row_to_comment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        comments.extend(rows);
    }
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(comments)
}

// ── Likes ──────────────────────────────────────────────────────────────

/// Like or unlike an event. Returns whether the user likes it afterwards.
pub fn toggle_like(conn: &Connection, event_id: i64, user_id: i64) -> Result<bool> {
    require_event(conn, event_id)?;
    users::get_user(conn, user_id)?;

    let removed = conn.execute(
        "DELETE FROM event_likes WHERE event_id = ?1 AND user_id = ?2",
        params![event_id, user_id],
    )?;
    if removed > 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO event_likes (event_id, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![event_id, user_id, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(true)
}

/// Distinct users who liked any event of the group.
pub fn group_like_count(conn: &Connection, event_id: i64) -> Result<i64> {
    let group = group_event_ids(conn, event_id)?;
    let placeholders = vec!["?"; group.len()].join(", ");
    let sql = format!(
        "SELECT COUNT(DISTINCT user_id) FROM event_likes WHERE event_id IN ({placeholders})"
    );
    let count = conn.query_row(&sql, rusqlite::params_from_iter(group.iter()), |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn new_event(companion: &str) -> NewEvent {
        NewEvent {
            world: WorldRef::new("The Black Cat", Some("#12345".into())),
            companion_name: companion.into(),
            start: at(20, 0),
            end: at(21, 0),
            notes: Some("karaoke".into()),
        }
    }

    #[test]
    fn manual_event_round_trip() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        let bob = users::register_user(&conn, "bob").unwrap();

        let event = create_manual_event(&mut conn, alice.id, &new_event("bob"), 10).unwrap();
        assert_eq!(event.duration_secs, 3600);
        assert_eq!(event.notes.as_deref(), Some("karaoke"));
        assert!(event.participants.contains(&alice.id));
        assert!(event.participants.contains(&bob.id));
        assert!(event.event_group_id.is_some());
        assert_eq!(list_events_for_user(&conn, alice.id).unwrap().len(), 1);
    }

    #[test]
    fn manual_event_rejects_inverted_interval() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        let mut bad = new_event("bob");
        bad.end = at(19, 0);
        let err = create_manual_event(&mut conn, alice.id, &bad, 10).unwrap_err();
        assert!(matches!(err, JournalError::InvalidEvent(_)));
        assert!(load_all_events(&conn).unwrap().is_empty());
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        let event = create_manual_event(&mut conn, alice.id, &new_event("bob"), 10).unwrap();

        assert!(add_tag(&conn, event.id, " music ").unwrap());
        assert!(!add_tag(&conn, event.id, "music").unwrap());
        assert!(add_tag(&conn, event.id, "late").unwrap());
        assert_eq!(tags_for_event(&conn, event.id).unwrap(), vec!["late", "music"]);
        assert!(remove_tag(&conn, event.id, "late").unwrap());
        assert_eq!(
            all_tags(&conn).unwrap(),
            vec![TagCount {
                name: "music".into(),
                count: 1
            }]
        );
    }

    #[test]
    fn delete_cascades_side_tables() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        let event = create_manual_event(&mut conn, alice.id, &new_event("bob"), 10).unwrap();
        add_tag(&conn, event.id, "music").unwrap();
        let c = add_comment(&conn, event.id, alice.id, "fun", None).unwrap();
        add_comment(&conn, event.id, alice.id, "agreed", Some(c.id)).unwrap();
        toggle_like(&conn, event.id, alice.id).unwrap();

        delete_event(&mut conn, event.id).unwrap();

        for table in ["event_tags", "event_comments", "event_likes", "event_participants", "event_groups"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "{table} not emptied");
        }
        assert!(matches!(get_event(&conn, event.id), Err(JournalError::EventNotFound(_))));
    }

    #[test]
    fn like_toggles() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        let event = create_manual_event(&mut conn, alice.id, &new_event("bob"), 10).unwrap();

        assert!(toggle_like(&conn, event.id, alice.id).unwrap());
        assert_eq!(group_like_count(&conn, event.id).unwrap(), 1);
        assert!(!toggle_like(&conn, event.id, alice.id).unwrap());
        assert_eq!(group_like_count(&conn, event.id).unwrap(), 0);
    }

    #[test]
    fn update_notes_on_missing_event_fails() {
        let conn = db::open_memory_database().unwrap();
        assert!(matches!(
            update_event_notes(&conn, 7, Some("x")),
            Err(JournalError::EventNotFound(7))
        ));
    }
}
