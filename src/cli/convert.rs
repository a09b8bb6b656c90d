//! CLI `convert` and `regroup` commands.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use rendezvous::config::JournalConfig;
use rendezvous::journal::convert::convert_user_logs;
use rendezvous::journal::{grouping, users};

/// Convert one user's log, or every user's when `username` is `None`.
pub fn convert(config: &JournalConfig, username: Option<&str>) -> Result<()> {
    let mut conn = super::open(config)?;

    if let Some(username) = username {
        let user = users::require_user(&conn, username)?;
        let result = convert_user_logs(&mut conn, user.id, &config.grouping)?;
        println!("Converted log for {}:", user.username);
        println!("  New events:        {}", result.converted_count);
        println!("  Duplicates:        {}", result.duplicate_count);
        println!("  Mirrored:          {}", result.mirrored_count);
        println!("  Unreadable rows:   {}", result.skipped_count);
        println!("  Friend edges:      {}", result.friend_edges_created);
        println!("  Groups:            {}", result.group_count);
        return Ok(());
    }

    let all = users::list_users(&conn)?;
    if all.is_empty() {
        println!("No users registered.");
        return Ok(());
    }

    let pb = ProgressBar::new(all.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    // One regroup at the end instead of one per user.
    let mut per_user = config.grouping.clone();
    per_user.regroup_after_convert = false;

    let mut converted = 0;
    let mut duplicates = 0;
    let mut failed = 0;
    for user in &all {
        pb.set_message(user.username.clone());
        match convert_user_logs(&mut conn, user.id, &per_user) {
            Ok(result) => {
                converted += result.converted_count;
                duplicates += result.duplicate_count;
            }
            Err(e) => {
                pb.println(format!("  {}: {e}", user.username));
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let groups = if config.grouping.regroup_after_convert {
        Some(grouping::regroup_all(&mut conn)?)
    } else {
        None
    };

    println!("Converted logs for {} users:", all.len() - failed);
    println!("  New events:        {converted}");
    println!("  Duplicates:        {duplicates}");
    if let Some(groups) = groups {
        println!("  Groups:            {}", groups.group_count);
    }
    if failed > 0 {
        println!("  Failed users:      {failed} (rolled back)");
    }
    Ok(())
}

pub fn regroup(config: &JournalConfig) -> Result<()> {
    let mut conn = super::open(config)?;
    let result = grouping::regroup_all(&mut conn)?;
    println!(
        "Regrouped {} events into {} groups ({} shared by several owners).",
        result.event_count, result.group_count, result.shared_group_count
    );
    Ok(())
}
