//! CLI `user` commands: register, list, and show friends.

use anyhow::Result;

use rendezvous::config::JournalConfig;
use rendezvous::journal::{friends, users};

pub fn add(config: &JournalConfig, username: &str) -> Result<()> {
    let conn = super::open(config)?;
    let user = users::register_user(&conn, username)?;
    println!("Registered {} (id {})", user.username, user.id);
    Ok(())
}

pub fn list(config: &JournalConfig) -> Result<()> {
    let conn = super::open(config)?;
    let all = users::list_users(&conn)?;
    if all.is_empty() {
        println!("No users registered. Add one with `rendezvous user add <name>`.");
        return Ok(());
    }
    println!("{:<6} {:<24} {}", "ID", "USERNAME", "REGISTERED");
    for user in all {
        println!("{:<6} {:<24} {}", user.id, user.username, user.created_at);
    }
    Ok(())
}

pub fn friends(config: &JournalConfig, username: &str) -> Result<()> {
    let conn = super::open(config)?;
    let user = users::require_user(&conn, username)?;
    let friends = friends::friends_of(&conn, user.id)?;
    if friends.is_empty() {
        println!("{} has no friends on record yet.", user.username);
        return Ok(());
    }
    println!("Friends of {}:", user.username);
    for friend in friends {
        println!("  {}", friend.username);
    }
    Ok(())
}
