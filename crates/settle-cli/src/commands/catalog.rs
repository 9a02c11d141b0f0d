//! Merchant catalog command implementations

use anyhow::Result;
use settle_core::db::Database;
use settle_core::models::NewCatalogEntry;

use super::CLI_ACTOR;

pub fn cmd_catalog_list(db: &Database, include_inactive: bool) -> Result<()> {
    let entries = db.list_catalog_entries(include_inactive)?;

    if entries.is_empty() {
        println!("Merchant catalog is empty.");
        return Ok(());
    }

    println!();
    println!("🏪 Merchant Catalog");
    println!("   ─────────────────────────────────────────────────────────────");

    for entry in entries {
        let category = match &entry.subcategory {
            Some(sub) => format!("{} / {}", entry.parent_category, sub),
            None => entry.parent_category.clone(),
        };
        let status = if entry.is_active { "" } else { " (disabled)" };
        println!(
            "   [{}] \"{}\" → {} ({:.2}){}",
            entry.id, entry.merchant_pattern, category, entry.confidence, status
        );
    }

    Ok(())
}

pub fn cmd_catalog_add(
    db: &Database,
    pattern: &str,
    parent: &str,
    subcategory: Option<&str>,
    confidence: f64,
) -> Result<()> {
    let id = db.create_catalog_entry(&NewCatalogEntry {
        merchant_pattern: pattern.to_string(),
        parent_category: parent.to_string(),
        subcategory: subcategory.map(String::from),
        confidence,
    })?;
    db.log_audit(CLI_ACTOR, "create", Some("catalog_entry"), Some(id), Some(pattern))?;

    println!("✅ Added catalog entry {} for \"{}\"", id, pattern);
    Ok(())
}

pub fn cmd_catalog_set_active(db: &Database, id: i64, active: bool) -> Result<()> {
    db.set_catalog_entry_active(id, active)?;
    let action = if active { "enable" } else { "disable" };
    db.log_audit(CLI_ACTOR, action, Some("catalog_entry"), Some(id), None)?;

    println!("✅ Catalog entry {} {}d", id, action);
    Ok(())
}
