//! Core journal type definitions.
//!
//! Defines [`PresenceKind`] and [`PresenceLogEntry`] (the raw per-observer log),
//! [`SharedEventCandidate`] (a reconstructed interval before persistence),
//! [`SharedEvent`] (a stored record), and the small identity types around them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Storage format for every persisted timestamp (ISO-like, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// World name used for join/leave lines seen before any location change.
pub const UNKNOWN_WORLD: &str = "(unknown world)";

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts the storage format, a space separator,
/// and fractional seconds.
pub fn parse_ts(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// The three things a client's presence log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    /// The observer moved into a world instance.
    LocationChange,
    /// Someone appeared in the observer's instance.
    PlayerJoin,
    /// Someone left the observer's instance (or the observer itself left).
    PlayerLeave,
}

impl PresenceKind {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocationChange => "location_change",
            Self::PlayerJoin => "player_join",
            Self::PlayerLeave => "player_leave",
        }
    }
}

impl std::fmt::Display for PresenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PresenceKind {
    type Err = String;

    /// Accepts the storage names, the client's own labels, and short aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "location_change" | "locationchange" | "location" | "位置变动" => {
                Ok(Self::LocationChange)
            }
            "player_join" | "playerjoin" | "join" | "玩家加入" => Ok(Self::PlayerJoin),
            "player_leave" | "playerleave" | "leave" | "玩家离开" => Ok(Self::PlayerLeave),
            _ => Err(format!("unknown presence kind: {s}")),
        }
    }
}

/// A world as the client names it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldRef {
    pub name: String,
    /// Client-side identifier such as `#53949`, when the log carried one.
    pub external_id: Option<String>,
}

impl WorldRef {
    pub fn new(name: impl Into<String>, external_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            external_id,
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_WORLD, None)
    }

    /// Identity used for every same-world comparison: the external id when
    /// present, the name otherwise.
    pub fn key(&self) -> &str {
        self.external_id.as_deref().unwrap_or(&self.name)
    }
}

/// One line of an observer's presence log. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceLogEntry {
    pub observer_id: i64,
    pub timestamp: NaiveDateTime,
    pub kind: PresenceKind,
    pub world: WorldRef,
    /// Instance access tag from a location change (`friends+`, `public`, ...).
    pub access_tag: Option<String>,
    /// Player the line is about. For location changes this is the observer.
    pub subject: String,
    pub is_friend: bool,
}

/// The user whose client produced a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observer {
    pub id: i64,
    pub username: String,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

impl From<&User> for Observer {
    fn from(user: &User) -> Self {
        Observer {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

/// A co-presence interval reconstructed from one observer's log, not yet stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedEventCandidate {
    pub owner_id: i64,
    pub owner_name: String,
    pub world: WorldRef,
    pub companion_name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Seconds between `start` and `end`.
    pub duration_secs: i64,
    /// Whether the log flagged the companion as a friend.
    pub companion_is_friend: bool,
    /// Registered users known to have been present: the owner, plus the
    /// companion once resolved against the user directory.
    pub participants: BTreeSet<i64>,
}

impl SharedEventCandidate {
    pub fn new(
        observer: &Observer,
        world: WorldRef,
        companion_name: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        companion_is_friend: bool,
    ) -> Self {
        Self {
            owner_id: observer.id,
            owner_name: observer.username.clone(),
            world,
            companion_name: companion_name.trim().to_string(),
            start,
            end,
            duration_secs: (end - start).num_seconds(),
            companion_is_friend,
            participants: BTreeSet::from([observer.id]),
        }
    }
}

/// A stored shared event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedEvent {
    pub id: i64,
    pub owner_id: i64,
    pub owner_name: String,
    pub world_id: i64,
    pub world: WorldRef,
    pub companion_name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_secs: i64,
    pub notes: Option<String>,
    pub participants: BTreeSet<i64>,
    pub participant_names: BTreeSet<String>,
    pub event_group_id: Option<i64>,
}

/// A cluster of events believed to be the same real occasion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventGroup {
    pub id: i64,
    /// Smallest event id in the cluster.
    pub anchor_event_id: i64,
    pub event_ids: Vec<i64>,
}
