//! Cross-observer merger: keeps one record per owner per real occasion.
//!
//! Every participant logs the same occasion from their side, and the same log is
//! often pasted more than once. [`merge_duplicates`] drops a candidate when its
//! owner already has a record (stored or earlier in the batch) of the same
//! occasion. The first record wins; fields are never merged, so notes written
//! on a stored event are never overwritten.
//!
//! Matches across different owners are the per-observer views of one occasion.
//! They are kept and only counted as `mirrored`; grouping links them later.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::journal::types::{SharedEvent, SharedEventCandidate};

/// Fields the same-occasion test looks at.
pub trait OccasionRecord {
    fn owner_id(&self) -> i64;
    fn owner_name(&self) -> &str;
    fn world_key(&self) -> &str;
    fn companion_name(&self) -> &str;
    fn interval(&self) -> (NaiveDateTime, NaiveDateTime);
    fn participants(&self) -> &BTreeSet<i64>;
}

impl OccasionRecord for SharedEventCandidate {
    fn owner_id(&self) -> i64 {
        self.owner_id
    }
    fn owner_name(&self) -> &str {
        &self.owner_name
    }
    fn world_key(&self) -> &str {
        self.world.key()
    }
    fn companion_name(&self) -> &str {
        &self.companion_name
    }
    fn interval(&self) -> (NaiveDateTime, NaiveDateTime) {
        (self.start, self.end)
    }
    fn participants(&self) -> &BTreeSet<i64> {
        &self.participants
    }
}

impl OccasionRecord for SharedEvent {
    fn owner_id(&self) -> i64 {
        self.owner_id
    }
    fn owner_name(&self) -> &str {
        &self.owner_name
    }
    fn world_key(&self) -> &str {
        self.world.key()
    }
    fn companion_name(&self) -> &str {
        &self.companion_name
    }
    fn interval(&self) -> (NaiveDateTime, NaiveDateTime) {
        (self.start, self.end)
    }
    fn participants(&self) -> &BTreeSet<i64> {
        &self.participants
    }
}

/// Two records describe the same occasion when they share the world and the
/// exact interval, and they are about the same people: equal companion names,
/// each naming the other's owner, or a registered participant in common other
/// than the owners themselves.
pub fn is_same_occasion<A, B>(a: &A, b: &B) -> bool
where
    A: OccasionRecord + ?Sized,
    B: OccasionRecord + ?Sized,
{
    if a.world_key() != b.world_key() || a.interval() != b.interval() {
        return false;
    }

    if a.companion_name() == b.companion_name() {
        return true;
    }

    if a.companion_name() == b.owner_name() && b.companion_name() == a.owner_name() {
        return true;
    }

    let owners = [a.owner_id(), b.owner_id()];
    a.participants()
        .intersection(b.participants())
        .any(|id| !owners.contains(id))
}

/// Result of a merge pass.
#[derive(Debug, Default, Serialize)]
pub struct MergeOutcome {
    /// Candidates that survive, in input order.
    pub kept: Vec<SharedEventCandidate>,
    /// Candidates dropped because their owner already records the occasion.
    pub duplicates: usize,
    /// Kept candidates that mirror another owner's record of the same occasion.
    pub mirrored: usize,
}

type OccasionKey = (String, NaiveDateTime, NaiveDateTime);

fn key_of<R: OccasionRecord + ?Sized>(r: &R) -> OccasionKey {
    let (start, end) = r.interval();
    (r.world_key().to_string(), start, end)
}

/// Remove candidates whose owner already has a record of the same occasion.
///
/// Idempotent: merging the kept list again against the same `existing` keeps
/// every candidate.
pub fn merge_duplicates(
    candidates: Vec<SharedEventCandidate>,
    existing: &[SharedEvent],
) -> MergeOutcome {
    // Only records with an identical (world, interval) can match, so bucket on it.
    let mut stored: HashMap<OccasionKey, Vec<&SharedEvent>> = HashMap::new();
    for event in existing {
        stored.entry(key_of(event)).or_default().push(event);
    }
    let mut batch: HashMap<OccasionKey, Vec<usize>> = HashMap::new();

    let mut outcome = MergeOutcome::default();

    for candidate in candidates {
        let key = key_of(&candidate);
        let stored_matches = stored.get(&key).map(Vec::as_slice).unwrap_or_default();
        let batch_matches = batch.get(&key).map(Vec::as_slice).unwrap_or_default();

        let same_owner_dup = stored_matches
            .iter()
            .any(|e| e.owner_id == candidate.owner_id && is_same_occasion(*e, &candidate))
            || batch_matches.iter().any(|&i| {
                let kept = &outcome.kept[i];
                kept.owner_id == candidate.owner_id && is_same_occasion(kept, &candidate)
            });

        if same_owner_dup {
            tracing::debug!(
                owner = %candidate.owner_name,
                companion = %candidate.companion_name,
                world = %candidate.world.name,
                "dropping duplicate candidate"
            );
            outcome.duplicates += 1;
            continue;
        }

        let mirrors = stored_matches
            .iter()
            .any(|e| is_same_occasion(*e, &candidate))
            || batch_matches
                .iter()
                .any(|&i| is_same_occasion(&outcome.kept[i], &candidate));
        if mirrors {
            outcome.mirrored += 1;
        }

        batch.entry(key).or_default().push(outcome.kept.len());
        outcome.kept.push(candidate);
    }

    outcome
}
