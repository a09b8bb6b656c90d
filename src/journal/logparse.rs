//! Parser for presence logs pasted out of the game client.
//!
//! The client prints one logical record per event but wraps long world and
//! player names across lines:
//!
//! ```text
//! 12/28 01:53
//!  位置变动
//!  メゾン荘 201号室 #53949 friends+
//! 12/28 01:52
//!  玩家离开
//!  💚
//!  SaKi43
//! ```
//!
//! A record starts on a line whose first token is `MM/DD`; every other
//! non-empty line continues the current record. Records that fail to parse are
//! reported as [`ParseIssue`]s and never abort the parse.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::journal::types::{PresenceKind, WorldRef};

/// Leading marker the client puts in front of friends.
pub const FRIEND_MARKER: &str = "💚";

static RECORD_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{1,2}/\d{1,2}(?:\s|$)").unwrap());

static RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})\s+(\d{1,2}):(\d{2})\s+(\S+)\s*(.*)$").unwrap()
});

/// Instance access tags the client appends after a world id.
const ACCESS_TAGS: &[&str] = &[
    "public", "friends", "friends+", "hidden", "invite", "invite+", "group", "group+",
    "group_public",
];

/// One logical record recovered from pasted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRecord {
    /// 1-based line number where the record starts.
    pub line: usize,
    pub timestamp: NaiveDateTime,
    pub kind: PresenceKind,
    /// Set for location changes only.
    pub world: Option<WorldRef>,
    pub access_tag: Option<String>,
    /// Set for joins and leaves only.
    pub player_name: Option<String>,
    pub is_friend: bool,
}

/// A record (or stray line) that was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseIssue {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ParseReport {
    /// Records in the order they appeared in the text.
    pub records: Vec<ParsedRecord>,
    pub issues: Vec<ParseIssue>,
}

impl ParseReport {
    pub fn skipped_count(&self) -> usize {
        self.issues.len()
    }
}

/// Split pasted text into logical records and parse each one.
///
/// `reference` anchors year inference: the log has no year, so each record
/// gets the latest year whose date is at most one day after `reference`.
pub fn parse_log_text(text: &str, reference: NaiveDateTime) -> ParseReport {
    let mut report = ParseReport::default();

    for (line, joined) in join_records(text, &mut report.issues) {
        match parse_record(&joined, reference) {
            Ok(mut record) => {
                record.line = line;
                report.records.push(record);
            }
            Err(reason) => report.issues.push(ParseIssue { line, reason }),
        }
    }

    tracing::debug!(
        records = report.records.len(),
        skipped = report.issues.len(),
        "parsed log text"
    );
    report
}

/// Re-join wrapped lines into `(start_line, record_text)` pairs.
fn join_records(text: &str, issues: &mut Vec<ParseIssue>) -> Vec<(usize, String)> {
    let mut records: Vec<(usize, String)> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if RECORD_START.is_match(raw) {
            records.push((line_no, trimmed.to_string()));
        } else if let Some((_, current)) = records.last_mut() {
            current.push(' ');
            current.push_str(trimmed);
        } else {
            issues.push(ParseIssue {
                line: line_no,
                reason: "text before first record".into(),
            });
        }
    }

    records
}

fn parse_record(text: &str, reference: NaiveDateTime) -> Result<ParsedRecord, String> {
    let caps = RECORD
        .captures(text)
        .ok_or_else(|| format!("malformed record: {text}"))?;

    let num = |i: usize| -> u32 { caps[i].parse().unwrap_or(u32::MAX) };
    let timestamp = infer_timestamp(num(1), num(2), num(3), num(4), reference)
        .ok_or_else(|| format!("invalid timestamp in record: {text}"))?;

    let kind: PresenceKind = caps[5].parse()?;
    let body = caps[6].trim();

    let mut record = ParsedRecord {
        line: 0,
        timestamp,
        kind,
        world: None,
        access_tag: None,
        player_name: None,
        is_friend: false,
    };

    match kind {
        PresenceKind::LocationChange => {
            let (world, access_tag) = parse_world(body)?;
            record.world = Some(world);
            record.access_tag = access_tag;
        }
        PresenceKind::PlayerJoin | PresenceKind::PlayerLeave => {
            let (name, is_friend) = parse_player(body)?;
            record.player_name = Some(name);
            record.is_friend = is_friend;
        }
    }

    Ok(record)
}

/// `world_name [#world_id] [access-tag]`
fn parse_world(body: &str) -> Result<(WorldRef, Option<String>), String> {
    let mut tokens: Vec<&str> = body.split_whitespace().collect();

    let access_tag = match tokens.last() {
        Some(t) if ACCESS_TAGS.contains(&t.to_ascii_lowercase().as_str()) => {
            tokens.pop().map(str::to_string)
        }
        _ => None,
    };

    let external_id = match tokens.last() {
        Some(t) if t.starts_with('#') && t.len() > 1 => tokens.pop().map(str::to_string),
        _ => None,
    };

    let name = tokens.join(" ");
    if name.is_empty() {
        return Err("location change without world name".into());
    }

    Ok((WorldRef::new(name, external_id), access_tag))
}

/// `[💚] player_name`
fn parse_player(body: &str) -> Result<(String, bool), String> {
    let (rest, is_friend) = match body.strip_prefix(FRIEND_MARKER) {
        Some(rest) => (rest, true),
        None => (body, false),
    };
    let name = rest.trim();
    if name.is_empty() {
        return Err("join/leave without player name".into());
    }
    Ok((name.to_string(), is_friend))
}

/// Attach a year to a `MM/DD HH:MM` stamp, looking back from `reference`.
fn infer_timestamp(
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    reference: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let latest = reference + Duration::days(1);
    // Walk back far enough to reach the previous Feb 29.
    (0..=4)
        .map(|back| reference.year() - back)
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .filter_map(|date| date.and_hms_opt(hour, minute, 0))
        .find(|ts| *ts <= latest)
}
