use anyhow::Result;

use rendezvous::config::JournalConfig;
use rendezvous::journal::{stats, users};

fn format_duration(secs: u64) -> String {
    let (h, m) = (secs / 3600, (secs % 3600) / 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else {
        format!("{m}m")
    }
}

/// Display a user's journal statistics in the terminal.
pub fn stats(config: &JournalConfig, username: &str) -> Result<()> {
    let conn = super::open(config)?;
    let user = users::require_user(&conn, username)?;
    let response = stats::journal_stats(&conn, user.id)?;

    println!("Journal Statistics for {}", response.username);
    println!("{}", "=".repeat(40));
    println!("  Events:              {}", response.total_events);
    println!("  Time together:       {}", format_duration(response.total_seconds));
    println!("  Companions:          {}", response.distinct_companions);
    println!("  Worlds:              {}", response.distinct_worlds);
    println!("  Occasions (groups):  {}", response.group_count);
    println!("  Friends:             {}", response.friend_count);
    println!();

    if !response.top_companions.is_empty() {
        println!("Top companions:");
        for c in &response.top_companions {
            println!("  {:<24} {:>10} ({} events)", c.name, format_duration(c.total_seconds), c.events);
        }
        println!();
    }

    if !response.top_worlds.is_empty() {
        println!("Top worlds:");
        for w in &response.top_worlds {
            println!("  {:<32} {}", w.name, w.events);
        }
        println!();
    }

    if let Some(ref first) = response.first_event {
        println!("First event:           {first}");
    }
    if let Some(ref last) = response.last_event {
        println!("Latest event:          {last}");
    }

    Ok(())
}
