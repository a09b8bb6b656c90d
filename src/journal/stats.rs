use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::Result;
use crate::journal::users;

const TOP_N: i64 = 5;

/// Response from journal_stats.
#[derive(Debug, Serialize)]
pub struct JournalStats {
    pub username: String,
    pub total_events: u64,
    pub total_seconds: u64,
    pub distinct_companions: u64,
    pub distinct_worlds: u64,
    /// Groups this user's events belong to.
    pub group_count: u64,
    pub friend_count: u64,
    pub top_companions: Vec<CompanionTime>,
    pub top_worlds: Vec<WorldVisits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CompanionTime {
    pub name: String,
    pub total_seconds: u64,
    pub events: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WorldVisits {
    pub name: String,
    pub events: u64,
}

/// Aggregate statistics over one user's events.
pub fn journal_stats(conn: &Connection, user_id: i64) -> Result<JournalStats> {
    let user = users::get_user(conn, user_id)?;

    let (total, seconds, companions, worlds, first, last): (i64, i64, i64, i64, Option<String>, Option<String>) =
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration), 0), COUNT(DISTINCT friend_name), \
                    COUNT(DISTINCT world_id), MIN(start_time), MAX(start_time) \
             FROM shared_events WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )?;

    let group_count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT event_group_id) FROM shared_events WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;

    let friend_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM (SELECT friend_id FROM friend_edges WHERE user_id = ?1 \
                               UNION SELECT user_id FROM friend_edges WHERE friend_id = ?1)",
        params![user_id],
        |row| row.get(0),
    )?;

    Ok(JournalStats {
        username: user.username,
        total_events: total as u64,
        total_seconds: seconds as u64,
        distinct_companions: companions as u64,
        distinct_worlds: worlds as u64,
        group_count: group_count as u64,
        friend_count: friend_count as u64,
        top_companions: top_companions(conn, user_id)?,
        top_worlds: top_worlds(conn, user_id)?,
        first_event: first,
        last_event: last,
    })
}

/// Companions by total time together.
fn top_companions(conn: &Connection, user_id: i64) -> Result<Vec<CompanionTime>> {
    let mut stmt = conn.prepare(
        "SELECT friend_name, SUM(duration), COUNT(*) FROM shared_events WHERE user_id = ?1 \
         GROUP BY friend_name ORDER BY SUM(duration) DESC, friend_name LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![user_id, TOP_N], |row| {
            Ok(CompanionTime {
                name: row.get(0)?,
                total_seconds: row.get::<_, i64>(1)? as u64,
                events: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Worlds by number of events.
fn top_worlds(conn: &Connection, user_id: i64) -> Result<Vec<WorldVisits>> {
    let mut stmt = conn.prepare(
        "SELECT w.world_name, COUNT(*) FROM shared_events e JOIN worlds w ON w.id = e.world_id \
         WHERE e.user_id = ?1 GROUP BY e.world_id ORDER BY COUNT(*) DESC, w.world_name LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![user_id, TOP_N], |row| {
            Ok(WorldVisits {
                name: row.get(0)?,
                events: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
