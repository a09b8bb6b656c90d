//! CLI `reset` command: delete all journal data after user confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use rendezvous::config::JournalConfig;

/// Delete all journal data after user confirmation. Users are kept unless
/// `include_users` is set.
pub fn reset(config: &JournalConfig, include_users: bool) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("WARNING: This will permanently delete ALL presence logs, events, groups, tags, comments and likes.");
    if include_users {
        println!("Registered users and friendships will be deleted too.");
    }
    println!("Database: {}", db_path.display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    let conn = rendezvous::db::open_database(&db_path)?;

    // Children before parents for the foreign keys
    conn.execute_batch(
        "BEGIN;
         DELETE FROM event_likes;
         DELETE FROM event_comments;
         DELETE FROM event_tags;
         DELETE FROM event_participants;
         DELETE FROM shared_events;
         DELETE FROM event_groups;
         DELETE FROM presence_logs;
         DELETE FROM worlds;
         COMMIT;",
    )?;
    if include_users {
        conn.execute_batch(
            "BEGIN;
             DELETE FROM friend_edges;
             DELETE FROM users;
             COMMIT;",
        )?;
    }

    println!("Journal data deleted. Database reset complete.");
    Ok(())
}
