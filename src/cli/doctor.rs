//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use rendezvous::config::JournalConfig;
use rendezvous::db;
use rendezvous::journal::friends;

/// Run database diagnostics and print a health report. With `repair`, restore
/// one-sided friend edges and regroup events left without a group.
pub fn doctor(config: &JournalConfig, repair: bool) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `rendezvous user add <name>` or `rendezvous serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let mut conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn)
        .context("failed to run health check")?;

    println!("Rendezvous Health Report");
    println!("========================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Users:           {}", report.user_count);
    println!("  Log entries:     {}", report.log_count);
    println!("  Events:          {}", report.event_count);
    println!("  Groups:          {}", report.group_count);
    println!("  Friend edges:    {}", report.friend_edge_count);
    println!();
    if report.ungrouped_event_count > 0 {
        println!("Ungrouped events:  {} (run `rendezvous regroup`)", report.ungrouped_event_count);
    }
    if report.asymmetric_friend_edges > 0 {
        println!("One-sided friends: {}", report.asymmetric_friend_edges);
    }
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }

    if repair {
        let restored = friends::repair_friend_edges(&conn, None)?;
        println!();
        println!("Repair:");
        println!("  Friend edges restored: {restored}");
        if report.ungrouped_event_count > 0 {
            let result = rendezvous::journal::grouping::regroup_all(&mut conn)?;
            println!("  Events regrouped:      {}", result.event_count);
        }
    }

    if !report.integrity_ok {
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db ~/.rendezvous/journal.db");
        println!("  2. Or export what is readable and start over:");
        println!("     rendezvous export > backup.json");
        println!("     rendezvous reset");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
