//! Transaction command implementations

use anyhow::Result;
use settle_core::db::Database;
use settle_core::CategoryResolver;

use super::{format_amount, truncate, CLI_ACTOR};

pub fn cmd_transactions_list(db: &Database, limit: i64) -> Result<()> {
    let transactions = db.list_transactions(limit, 0)?;

    if transactions.is_empty() {
        println!("No transactions found. Ingest some with:");
        println!("  settle ingest --file rows.csv");
        return Ok(());
    }

    let total = db.count_transactions()?;

    println!();
    println!("📝 Recent Transactions ({} total)", total);
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in transactions {
        let category = match (&tx.category, tx.manual_override) {
            (Some(c), true) => format!("{} ✋", c),
            (Some(c), false) => format!("{} ({:.2})", c, tx.confidence_score),
            (None, _) => "-".to_string(),
        };
        println!(
            "   [{}] {} │ {:<8} │ {:>10} │ {:<35} │ {}",
            tx.id,
            tx.date,
            truncate(&tx.vendor, 8),
            format_amount(tx.amount),
            truncate(&tx.description, 35),
            category
        );
    }

    Ok(())
}

pub fn cmd_transactions_set_category(db: &Database, id: i64, category_id: i64) -> Result<()> {
    let resolver = CategoryResolver::new(db);
    let category = resolver.resolve_by_id(category_id)?;

    db.set_manual_category(id, &category)?;
    db.log_audit(
        CLI_ACTOR,
        "set_category",
        Some("transaction"),
        Some(id),
        Some(&category.name),
    )?;

    println!("✅ Transaction {} set to '{}' (manual)", id, category.name);
    Ok(())
}
