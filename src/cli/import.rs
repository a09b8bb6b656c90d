//! CLI `import` command: load pasted client log text from a file.

use anyhow::{Context, Result};
use std::path::Path;

use rendezvous::config::JournalConfig;
use rendezvous::journal::types::parse_ts;
use rendezvous::journal::{ingest, users};

/// Import a presence log for `username`. `reference` anchors the year of the
/// log's `MM/DD` stamps; it defaults to now.
pub fn import(
    config: &JournalConfig,
    username: &str,
    file: &Path,
    reference: Option<&str>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read log file: {}", file.display()))?;

    let reference = match reference {
        Some(raw) => parse_ts(raw).with_context(|| format!("invalid reference timestamp: {raw}"))?,
        None => chrono::Local::now().naive_local(),
    };

    let mut conn = super::open(config)?;
    let user = users::require_user(&conn, username)?;
    let result = ingest::import_log_text(&mut conn, user.id, &text, reference)?;

    println!("Import complete for {}:", user.username);
    println!("  Entries imported:  {}", result.imported_count);
    println!("  Already present:   {}", result.duplicate_count);
    println!("  Skipped:           {}", result.skipped_count);
    for issue in result.issues.iter().take(10) {
        println!("    line {}: {}", issue.line, issue.reason);
    }
    if result.issues.len() > 10 {
        println!("    ... and {} more", result.issues.len() - 10);
    }
    Ok(())
}
