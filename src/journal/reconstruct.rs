//! Session reconstruction: one observer's log into co-presence intervals.
//!
//! The reconstructor walks the log once, keeping a "present since" entry per
//! (world, subject). A leave closes the subject's interval. When the observer
//! itself leaves a world or moves to another one, everyone still tracked in the
//! world left behind is closed at that moment: the observer cannot vouch for
//! co-presence past it.
//!
//! Leaves without a matching join are expected in truncated logs and are
//! ignored. Duplicate joins collapse onto the first one.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use crate::journal::types::{
    Observer, PresenceKind, PresenceLogEntry, SharedEventCandidate, WorldRef,
};

#[derive(Debug)]
struct Presence {
    world: WorldRef,
    since: NaiveDateTime,
    is_friend: bool,
}

/// The observer's own stay in one world instance.
#[derive(Debug)]
struct Visit {
    world_key: String,
    since: NaiveDateTime,
}

struct Reconstructor<'a> {
    observer: &'a Observer,
    visit: Option<Visit>,
    /// Keyed by (world key, subject name) so output order is deterministic.
    present: BTreeMap<(String, String), Presence>,
    out: Vec<SharedEventCandidate>,
}

/// Rebuild co-presence intervals from one observer's log.
///
/// Entries are expected in non-decreasing timestamp order; the input is
/// stable-sorted anyway, so equal timestamps keep their given order. Entries
/// recorded by another observer are ignored.
pub fn reconstruct_sessions(
    observer: &Observer,
    entries: &[PresenceLogEntry],
) -> Vec<SharedEventCandidate> {
    let mut ordered: Vec<&PresenceLogEntry> = entries
        .iter()
        .filter(|e| e.observer_id == observer.id)
        .collect();
    ordered.sort_by_key(|e| e.timestamp);

    let mut r = Reconstructor {
        observer,
        visit: None,
        present: BTreeMap::new(),
        out: Vec::new(),
    };

    for entry in ordered {
        match entry.kind {
            PresenceKind::LocationChange => r.on_location_change(entry),
            PresenceKind::PlayerJoin => r.on_join(entry),
            PresenceKind::PlayerLeave => r.on_leave(entry),
        }
    }

    if !r.present.is_empty() {
        tracing::debug!(
            observer = %observer.username,
            open = r.present.len(),
            "log ended with subjects still present; no end attested"
        );
    }

    r.out
}

impl Reconstructor<'_> {
    fn is_observer(&self, subject: &str) -> bool {
        subject.trim() == self.observer.username
    }

    fn on_location_change(&mut self, entry: &PresenceLogEntry) {
        if !entry.subject.trim().is_empty() && !self.is_observer(&entry.subject) {
            return;
        }
        let world_key = entry.world.key().to_string();
        if self.visit.as_ref().is_some_and(|v| v.world_key == world_key) {
            // Repeated location line for the instance we are already in.
            return;
        }
        // Moving elsewhere ends every co-presence in the worlds left behind.
        let keys: Vec<(String, String)> = self
            .present
            .keys()
            .filter(|(w, _)| *w != world_key)
            .cloned()
            .collect();
        self.force_close(keys, entry.timestamp);
        self.visit = Some(Visit {
            world_key,
            since: entry.timestamp,
        });
    }

    fn on_join(&mut self, entry: &PresenceLogEntry) {
        if self.is_observer(&entry.subject) {
            return;
        }
        let key = (entry.world.key().to_string(), entry.subject.trim().to_string());
        self.present.entry(key).or_insert_with(|| Presence {
            world: entry.world.clone(),
            since: entry.timestamp,
            is_friend: entry.is_friend,
        });
    }

    fn on_leave(&mut self, entry: &PresenceLogEntry) {
        let world_key = entry.world.key().to_string();

        if self.is_observer(&entry.subject) {
            let keys: Vec<(String, String)> = self
                .present
                .keys()
                .filter(|(w, _)| *w == world_key)
                .cloned()
                .collect();
            self.force_close(keys, entry.timestamp);
            if self.visit.as_ref().is_some_and(|v| v.world_key == world_key) {
                self.visit = None;
            }
            return;
        }

        let key = (world_key, entry.subject.trim().to_string());
        if let Some(presence) = self.present.remove(&key) {
            let start = presence.since;
            self.emit(&key.1, presence, start, entry.timestamp);
        }
    }

    /// Close tracked subjects because the observer is gone. The interval starts
    /// no earlier than the observer's own arrival, and empty overlaps are dropped.
    fn force_close(&mut self, keys: Vec<(String, String)>, at: NaiveDateTime) {
        let visit_since = self.visit.as_ref().map(|v| v.since);
        for key in keys {
            let Some(presence) = self.present.remove(&key) else {
                continue;
            };
            let start = match visit_since {
                Some(since) => presence.since.max(since),
                None => presence.since,
            };
            if start < at {
                self.emit(&key.1, presence, start, at);
            }
        }
    }

    fn emit(&mut self, subject: &str, presence: Presence, start: NaiveDateTime, end: NaiveDateTime) {
        self.out.push(SharedEventCandidate::new(
            self.observer,
            presence.world,
            subject,
            start,
            end,
            presence.is_friend,
        ));
    }
}
