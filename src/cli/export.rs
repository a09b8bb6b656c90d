use anyhow::Result;
use serde::Serialize;

use rendezvous::config::JournalConfig;
use rendezvous::journal::types::{SharedEvent, User};
use rendezvous::journal::{events, users};

/// Export format.
#[derive(Debug, Serialize)]
struct ExportData {
    exported_at: String,
    users: Vec<User>,
    friendships: Vec<(String, String)>,
    events: Vec<ExportedEvent>,
}

#[derive(Debug, Serialize)]
struct ExportedEvent {
    #[serde(flatten)]
    event: SharedEvent,
    tags: Vec<String>,
}

/// Export users, friendships and events (with tags) as JSON to stdout.
pub fn export(config: &JournalConfig) -> Result<()> {
    let conn = super::open(config)?;

    let users = users::list_users(&conn)?;

    // Each friendship once, as (smaller name, larger name)
    let mut stmt = conn.prepare(
        "SELECT DISTINCT MIN(a.username, b.username), MAX(a.username, b.username) \
         FROM friend_edges f \
         JOIN users a ON a.id = f.user_id JOIN users b ON b.id = f.friend_id \
         ORDER BY 1, 2",
    )?;
    let friendships = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut exported = Vec::new();
    for event in events::load_all_events(&conn)? {
        let tags = events::tags_for_event(&conn, event.id)?;
        exported.push(ExportedEvent { event, tags });
    }

    let data = ExportData {
        exported_at: chrono::Utc::now().to_rfc3339(),
        users,
        friendships,
        events: exported,
    };

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    eprintln!(
        "Exported {} users, {} friendships and {} events.",
        data.users.len(),
        data.friendships.len(),
        data.events.len()
    );

    Ok(())
}
