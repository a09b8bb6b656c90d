//! Conversion: turning a user's stored presence log into shared events.
//!
//! The pipeline reads the log, reconstructs intervals, resolves companions
//! against registered users, and merges against events already stored. Reads
//! and writes (new events, friend edges, and the regroup) go through one
//! immediate transaction, so a failure leaves the journal exactly as it was and
//! two conversions of the same log cannot both insert it.
//!
//! Converting the same log twice writes nothing the second time.

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::config::GroupingConfig;
use crate::error::{JournalError, Result};
use crate::journal::events;
use crate::journal::friends;
use crate::journal::grouping;
use crate::journal::ingest;
use crate::journal::merge::{merge_duplicates, MergeOutcome};
use crate::journal::reconstruct::reconstruct_sessions;
use crate::journal::types::{Observer, SharedEventCandidate};
use crate::journal::users;

/// Result returned from a conversion pass.
#[derive(Debug, Serialize)]
pub struct ConvertResult {
    pub success: bool,
    /// New events written.
    pub converted_count: usize,
    /// Intervals the owner already had on record.
    pub duplicate_count: usize,
    /// New events that another owner also recorded.
    pub mirrored_count: usize,
    /// Stored log rows that could not be read.
    pub skipped_count: usize,
    pub friend_edges_created: usize,
    /// Groups in the journal after the pass.
    pub group_count: usize,
}

/// Add the companion to each candidate's participants when the companion is a
/// registered user.
pub fn resolve_participants(
    candidates: &mut [SharedEventCandidate],
    directory: &HashMap<String, i64>,
) {
    for candidate in candidates {
        if let Some(&id) = directory.get(&candidate.companion_name) {
            candidate.participants.insert(id);
        }
    }
}

/// Convert one user's presence log into shared events.
pub fn convert_user_logs(
    conn: &mut Connection,
    user_id: i64,
    config: &GroupingConfig,
) -> Result<ConvertResult> {
    // Take the write lock before reading, so the merge sees every committed event
    // and no other writer can add one before this pass commits.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let (observer, outcome, skipped, inserted, edges, group_count) = (|| -> Result<(Observer, MergeOutcome, usize, usize, usize, usize)> {
        let user = users::get_user(&tx, user_id)?;
        let observer = Observer::from(&user);

        let log = ingest::load_observer_log(&tx, user_id)?;
        let mut candidates = reconstruct_sessions(&observer, &log.entries);
        let directory = users::user_directory(&tx)?;
        resolve_participants(&mut candidates, &directory);

        // Companions who are registered users and flagged as friends in the log.
        let friend_ids: BTreeSet<i64> = candidates
            .iter()
            .filter(|c| c.companion_is_friend)
            .filter_map(|c| directory.get(&c.companion_name).copied())
            .filter(|&id| id != user_id)
            .collect();

        let existing = events::load_all_events(&tx)?;
        let outcome = merge_duplicates(candidates, &existing);

        let ids = events::insert_candidates(&tx, &outcome.kept)?;

        let mut edges = 0;
        for &friend_id in &friend_ids {
            if friends::ensure_symmetric_friend_edge(&tx, user_id, friend_id)? {
                edges += 1;
            }
        }

        let group_count = if config.regroup_after_convert {
            grouping::regroup_in(&tx)?.group_count
        } else {
            let n: i64 = tx.query_row("SELECT COUNT(*) FROM event_groups", [], |row| row.get(0))?;
            n as usize
        };
        Ok((observer, outcome, log.skipped, ids.len(), edges, group_count))
    })()
    .map_err(|e| e.in_pass("conversion"))?;
    tx.commit()
        .map_err(|e| JournalError::rolled_back("conversion", e))?;

    tracing::info!(
        user = %observer.username,
        converted = inserted,
        duplicates = outcome.duplicates,
        mirrored = outcome.mirrored,
        skipped,
        friend_edges = edges,
        groups = group_count,
        "presence log converted"
    );

    Ok(ConvertResult {
        success: true,
        converted_count: inserted,
        duplicate_count: outcome.duplicates,
        mirrored_count: outcome.mirrored,
        skipped_count: skipped,
        friend_edges_created: edges,
        group_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::journal::types::{Observer, PresenceKind, PresenceLogEntry, WorldRef};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn entry(observer_id: i64, kind: PresenceKind, subject: &str, ts: NaiveDateTime, is_friend: bool) -> PresenceLogEntry {
        PresenceLogEntry {
            observer_id,
            timestamp: ts,
            kind,
            world: WorldRef::new("W", Some("#777".into())),
            access_tag: None,
            subject: subject.into(),
            is_friend,
        }
    }

    #[test]
    fn resolve_adds_registered_companions_only() {
        let observer = Observer {
            id: 1,
            username: "alice".into(),
        };
        let mut candidates = vec![
            SharedEventCandidate::new(&observer, WorldRef::unknown(), "bob", at(1, 0), at(2, 0), false),
            SharedEventCandidate::new(&observer, WorldRef::unknown(), "stranger", at(1, 0), at(2, 0), false),
        ];
        let directory = HashMap::from([("alice".to_string(), 1), ("bob".to_string(), 2)]);
        resolve_participants(&mut candidates, &directory);
        assert_eq!(candidates[0].participants, BTreeSet::from([1, 2]));
        assert_eq!(candidates[1].participants, BTreeSet::from([1]));
    }

    #[test]
    fn reconverting_writes_nothing_new() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        ingest::append_entries(
            &conn,
            &[
                entry(alice.id, PresenceKind::PlayerJoin, "bob", at(14, 0), true),
                entry(alice.id, PresenceKind::PlayerLeave, "bob", at(14, 45), true),
            ],
        )
        .unwrap();

        let config = GroupingConfig::default();
        let first = convert_user_logs(&mut conn, alice.id, &config).unwrap();
        assert_eq!(first.converted_count, 1);
        let second = convert_user_logs(&mut conn, alice.id, &config).unwrap();
        assert_eq!(second.converted_count, 0);
        assert_eq!(second.duplicate_count, 1);
        assert_eq!(events::load_all_events(&conn).unwrap().len(), 1);
    }

    #[test]
    fn friend_flag_on_registered_companion_creates_edge() {
        let mut conn = db::open_memory_database().unwrap();
        let alice = users::register_user(&conn, "alice").unwrap();
        let bob = users::register_user(&conn, "bob").unwrap();
        ingest::append_entries(
            &conn,
            &[
                entry(alice.id, PresenceKind::PlayerJoin, "bob", at(14, 0), true),
                entry(alice.id, PresenceKind::PlayerLeave, "bob", at(14, 45), true),
            ],
        )
        .unwrap();

        let result = convert_user_logs(&mut conn, alice.id, &GroupingConfig::default()).unwrap();
        assert_eq!(result.friend_edges_created, 1);
        let bobs_friends = friends::friends_of(&conn, bob.id).unwrap();
        assert_eq!(bobs_friends.len(), 1);
        assert_eq!(bobs_friends[0].id, alice.id);
    }

    #[test]
    fn unknown_user_is_reported() {
        let mut conn = db::open_memory_database().unwrap();
        let err = convert_user_logs(&mut conn, 9, &GroupingConfig::default()).unwrap_err();
        assert!(err.is_not_found());
    }
}
