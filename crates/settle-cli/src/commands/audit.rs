//! Audit log command

use anyhow::Result;
use settle_core::db::Database;

pub fn cmd_audit(db: &Database, limit: i64) -> Result<()> {
    let entries = db.list_audit_log(limit)?;

    if entries.is_empty() {
        println!("Audit log is empty.");
        return Ok(());
    }

    println!();
    println!("📜 Audit Log");
    println!("   ─────────────────────────────────────────────────────────────");

    for entry in entries {
        let target = match (&entry.entity_type, entry.entity_id) {
            (Some(t), Some(id)) => format!("{} {}", t, id),
            (Some(t), None) => t.clone(),
            _ => String::new(),
        };
        let details = entry
            .details
            .as_ref()
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        println!(
            "   {} │ {:<10} │ {:<12} {}{}",
            entry.timestamp, entry.actor, entry.action, target, details
        );
    }

    Ok(())
}
