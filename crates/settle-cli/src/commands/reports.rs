//! Report command implementations

use anyhow::Result;
use chrono::NaiveDate;
use settle_core::db::Database;

pub fn cmd_report_monthly(db: &Database, period: &str) -> Result<()> {
    let report = db.monthly_expenses(period)?;

    println!();
    println!("📊 Expenses for {}", report.period);
    println!("   ─────────────────────────────");
    println!(
        "   Total:        {:.2} ({} transactions)",
        report.total.abs(),
        report.transaction_count
    );
    if report.excluded_settlements > 0 {
        println!(
            "   Settlements:  {:.2} excluded ({} card payments)",
            report.excluded_amount.abs(),
            report.excluded_settlements
        );
    }

    Ok(())
}

pub fn cmd_report_categories(db: &Database, from: NaiveDate, to: NaiveDate) -> Result<()> {
    let spending = db.spending_by_category(from, to)?;

    if spending.is_empty() {
        println!("No expenses between {} and {}", from, to);
        return Ok(());
    }

    let total: f64 = spending.iter().map(|s| s.amount).sum();

    println!();
    println!("📊 Spending by Category ({} to {})", from, to);
    println!("   ─────────────────────────────────────────────────────────────");

    for s in &spending {
        let pct = if total > 0.0 { s.amount / total * 100.0 } else { 0.0 };
        let bar_len = (pct / 5.0).round() as usize;
        println!(
            "   {:<25} {:>10.2} {:>5.1}% {}",
            s.category,
            s.amount,
            pct,
            "█".repeat(bar_len)
        );
    }
    println!("   {:<25} {:>10.2}", "Total", total);

    Ok(())
}

pub fn cmd_report_category(
    db: &Database,
    id: i64,
    from: NaiveDate,
    to: NaiveDate,
    include_subcategories: bool,
) -> Result<()> {
    let spending = db.category_spending(id, from, to, include_subcategories)?;

    let scope = if include_subcategories {
        " (with subcategories)"
    } else {
        ""
    };
    println!();
    println!("📊 {}{} from {} to {}", spending.category, scope, from, to);
    println!(
        "   {:.2} across {} transactions",
        spending.amount, spending.transaction_count
    );

    Ok(())
}
