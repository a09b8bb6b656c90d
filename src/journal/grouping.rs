//! Event grouping: clusters the per-observer copies of one occasion.
//!
//! Grouping is a stateless batch recompute: every run clears all assignments,
//! matches events pairwise, unions the matches, and gives every leftover event a
//! singleton group. Membership is therefore a pure function of the current event
//! rows, so a run that raced with a conversion is corrected by the next one.
//!
//! Two events match when they belong to different owners, share a world,
//! overlap in time with inclusive bounds, and are linked by participants.
//! Matching is transitive through the union-find: A–B and B–C put A, B and C in
//! one group even when A and C never overlap.
//!
//! Cost is O(N²) comparisons per world in the worst case. Events are swept in
//! start order so non-overlapping pairs are skipped, which keeps a personal
//! journal (hundreds to low thousands of events) well under a second.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{JournalError, Result};
use crate::journal::events;
use crate::journal::types::{EventGroup, SharedEvent};

/// Result of a regroup pass.
#[derive(Debug, Serialize)]
pub struct RegroupResult {
    pub success: bool,
    pub event_count: usize,
    pub group_count: usize,
    /// Groups holding more than one event.
    pub shared_group_count: usize,
    /// Events with unreadable timestamps, each placed in a group of its own.
    pub unreadable_count: usize,
}

/// Whether two events are views of the same occasion.
pub fn events_match(a: &SharedEvent, b: &SharedEvent) -> bool {
    a.owner_id != b.owner_id
        && a.world.key() == b.world.key()
        && a.start <= b.end
        && b.start <= a.end
        && participants_linked(a, b)
}

fn participants_linked(a: &SharedEvent, b: &SharedEvent) -> bool {
    !a.participants.is_disjoint(&b.participants)
        || b.participant_names.contains(&a.companion_name)
        || a.participant_names.contains(&b.companion_name)
}

/// Union-find over event indices, with path halving and union by rank.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Partition events into groups. Maps every event id to its group key, the
/// smallest event id in its component, so equal input always gives equal output.
pub fn recompute_groups(events: &[SharedEvent]) -> BTreeMap<i64, i64> {
    let mut set = DisjointSet::new(events.len());

    let mut by_world: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, event) in events.iter().enumerate() {
        by_world.entry(event.world.key()).or_default().push(i);
    }

    for indices in by_world.values_mut() {
        indices.sort_by_key(|&i| (events[i].start, events[i].id));
        for (pos, &i) in indices.iter().enumerate() {
            for &j in &indices[pos + 1..] {
                // Sorted by start: nothing further along can overlap `i`.
                if events[j].start > events[i].end {
                    break;
                }
                if events_match(&events[i], &events[j]) {
                    set.union(i, j);
                }
            }
        }
    }

    let mut anchor: BTreeMap<usize, i64> = BTreeMap::new();
    for (i, event) in events.iter().enumerate() {
        let root = set.find(i);
        let slot = anchor.entry(root).or_insert(event.id);
        *slot = (*slot).min(event.id);
    }

    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            let root = set.find(i);
            (event.id, anchor[&root])
        })
        .collect()
}

/// Recompute and persist every group on the caller's transaction.
pub fn regroup_in(conn: &Connection) -> Result<RegroupResult> {
    let events = events::load_all_events(conn)?;
    let assignment = recompute_groups(&events);

    conn.execute("UPDATE shared_events SET event_group_id = NULL", [])?;
    conn.execute("DELETE FROM event_groups", [])?;

    let now = chrono::Utc::now().to_rfc3339();
    let anchors: BTreeSet<i64> = assignment.values().copied().collect();
    let mut group_ids: BTreeMap<i64, i64> = BTreeMap::new();
    {
        let mut insert = conn.prepare(
            "INSERT INTO event_groups (anchor_event_id, created_at) VALUES (?1, ?2)",
        )?;
        for anchor in &anchors {
            insert.execute(params![anchor, now])?;
            group_ids.insert(*anchor, conn.last_insert_rowid());
        }
    }

    let mut sizes: BTreeMap<i64, usize> = BTreeMap::new();
    {
        let mut assign =
            conn.prepare("UPDATE shared_events SET event_group_id = ?1 WHERE id = ?2")?;
        for (event_id, anchor) in &assignment {
            let group_id = group_ids[anchor];
            assign.execute(params![group_id, event_id])?;
            *sizes.entry(group_id).or_default() += 1;
        }
    }

    // Rows the loader could not read still get exactly one group.
    let unreadable: Vec<i64> = {
        let mut stmt =
            conn.prepare("SELECT id FROM shared_events WHERE event_group_id IS NULL ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        ids
    };
    for &event_id in &unreadable {
        conn.execute(
            "INSERT INTO event_groups (anchor_event_id, created_at) VALUES (?1, ?2)",
            params![event_id, now],
        )?;
        conn.execute(
            "UPDATE shared_events SET event_group_id = ?1 WHERE id = ?2",
            params![conn.last_insert_rowid(), event_id],
        )?;
    }
    if !unreadable.is_empty() {
        tracing::warn!(count = unreadable.len(), "unreadable events given singleton groups");
    }

    Ok(RegroupResult {
        success: true,
        event_count: events.len() + unreadable.len(),
        group_count: anchors.len() + unreadable.len(),
        shared_group_count: sizes.values().filter(|&&n| n > 1).count(),
        unreadable_count: unreadable.len(),
    })
}

/// Full regroup in its own transaction. Nothing changes if any step fails.
pub fn regroup_all(conn: &mut Connection) -> Result<RegroupResult> {
    let tx = conn.transaction()?;
    let result = regroup_in(&tx).map_err(|e| e.in_pass("regroup"))?;
    tx.commit()
        .map_err(|e| JournalError::rolled_back("regroup", e))?;

    tracing::info!(
        events = result.event_count,
        groups = result.group_count,
        shared = result.shared_group_count,
        "event groups recomputed"
    );
    Ok(result)
}

/// Windowed lookup for a single new event: the group of an existing event from
/// another owner in the same world whose start and end both lie within
/// `window_minutes` of this one's, and that shares a participant link.
///
/// Deprecated fast path. It misses chains a full [`regroup_all`] would find,
/// and a full regroup always overrides what it decided.
pub fn find_group_for_event(
    conn: &Connection,
    event_id: i64,
    window_minutes: i64,
) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT o.event_group_id FROM shared_events e \
         JOIN shared_events o ON o.world_id = e.world_id AND o.user_id <> e.user_id AND o.id <> e.id \
         WHERE e.id = ?1 \
           AND o.event_group_id IS NOT NULL \
           AND ABS(strftime('%s', o.start_time) - strftime('%s', e.start_time)) <= ?2 \
           AND ABS(strftime('%s', o.end_time) - strftime('%s', e.end_time)) <= ?2 \
           AND ( \
             EXISTS (SELECT 1 FROM event_participants pe \
                     JOIN event_participants po ON po.user_id = pe.user_id \
                     WHERE pe.event_id = e.id AND po.event_id = o.id) \
             OR EXISTS (SELECT 1 FROM event_participants po JOIN users u ON u.id = po.user_id \
                        WHERE po.event_id = o.id AND u.username = e.friend_name) \
             OR EXISTS (SELECT 1 FROM event_participants pe JOIN users u ON u.id = pe.user_id \
                        WHERE pe.event_id = e.id AND u.username = o.friend_name)) \
         ORDER BY o.id LIMIT 1",
        params![event_id, window_minutes * 60],
        |row| row.get(0),
    )
    .optional()
}

/// Put one event into a group without a full recompute: the group found by
/// [`find_group_for_event`], or a new singleton. Returns the group id.
pub fn attach_to_group(
    conn: &Connection,
    event_id: i64,
    window_minutes: i64,
) -> rusqlite::Result<i64> {
    let group_id = match find_group_for_event(conn, event_id, window_minutes)? {
        Some(group_id) => group_id,
        None => {
            conn.execute(
                "INSERT INTO event_groups (anchor_event_id, created_at) VALUES (?1, ?2)",
                params![event_id, chrono::Utc::now().to_rfc3339()],
            )?;
            conn.last_insert_rowid()
        }
    };
    conn.execute(
        "UPDATE shared_events SET event_group_id = ?1 WHERE id = ?2",
        params![group_id, event_id],
    )?;
    tracing::debug!(event_id, group_id, "event attached to group");
    Ok(group_id)
}

pub fn group_members(conn: &Connection, group_id: i64) -> Result<Vec<SharedEvent>> {
    events::list_events_in_group(conn, group_id)
}

/// The group an event belongs to, or `None` before grouping has run.
pub fn group_of_event(conn: &Connection, event_id: i64) -> Result<Option<EventGroup>> {
    let row: Option<(i64, i64)> = conn
        .query_row(
            "SELECT g.id, g.anchor_event_id FROM shared_events e \
             JOIN event_groups g ON g.id = e.event_group_id WHERE e.id = ?1",
            params![event_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, anchor_event_id)) = row else {
        // Distinguish "ungrouped" from "no such event".
        events::get_event(conn, event_id)?;
        return Ok(None);
    };

    let mut stmt =
        conn.prepare("SELECT id FROM shared_events WHERE event_group_id = ?1 ORDER BY id")?;
    let event_ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;

    Ok(Some(EventGroup {
        id,
        anchor_event_id,
        event_ids,
    }))
}
