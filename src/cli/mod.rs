pub mod convert;
pub mod doctor;
pub mod export;
pub mod import;
pub mod reset;
pub mod stats;
pub mod users;

use anyhow::{Context, Result};
use rusqlite::Connection;

use rendezvous::config::JournalConfig;
use rendezvous::db;

/// Open the configured journal database.
fn open(config: &JournalConfig) -> Result<Connection> {
    let db_path = config.resolved_db_path();
    db::open_database(&db_path)
        .with_context(|| format!("failed to open journal at {}", db_path.display()))
}
