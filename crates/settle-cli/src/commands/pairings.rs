//! Account pairing and settlement command implementations

use anyhow::Result;
use chrono::NaiveDate;
use settle_core::db::Database;
use settle_core::models::{NewAccountPairing, PairingPatch};
use settle_core::{
    analyze_discrepancy, PipelineConfig, SettlementCandidate, SettlementFinder, SettlementQuery,
};

use super::{format_amount, truncate, CLI_ACTOR};

pub fn cmd_pairings_list(db: &Database, include_inactive: bool) -> Result<()> {
    let pairings = db.list_pairings(include_inactive)?;

    if pairings.is_empty() {
        println!("No pairings defined. Find settlements with:");
        println!("  settle pairings smart-match <card vendor> <bank vendor> --nickname \"Visa Gold\"");
        return Ok(());
    }

    println!();
    println!("🔗 Account Pairings");
    println!("   ─────────────────────────────────────────────────────────────");

    for p in pairings {
        let status = match (p.is_active, p.discrepancy_acknowledged) {
            (false, _) => " (inactive)",
            (true, true) => " (discrepancy acknowledged)",
            (true, false) => "",
        };
        println!(
            "   [{}] {} {} ⇐ {} {}{}",
            p.id,
            p.credit_card_vendor,
            p.credit_card_account_number.as_deref().unwrap_or("*"),
            p.bank_vendor,
            p.bank_account_number.as_deref().unwrap_or("*"),
            status
        );
        println!("       patterns: {}", p.match_patterns.join(", "));
    }

    Ok(())
}

pub fn cmd_pairings_add(
    db: &Database,
    cc_vendor: &str,
    bank_vendor: &str,
    cc_account: Option<String>,
    bank_account: Option<String>,
    patterns: Vec<String>,
) -> Result<()> {
    let pairing = db.create_pairing(&NewAccountPairing {
        credit_card_vendor: cc_vendor.to_string(),
        credit_card_account_number: cc_account,
        bank_vendor: bank_vendor.to_string(),
        bank_account_number: bank_account,
        match_patterns: patterns,
    })?;
    db.log_audit(
        CLI_ACTOR,
        "create",
        Some("pairing"),
        Some(pairing.id),
        Some(&pairing.match_patterns.join(", ")),
    )?;

    println!(
        "✅ Created pairing {} ({} ⇐ {})",
        pairing.id, pairing.credit_card_vendor, pairing.bank_vendor
    );
    Ok(())
}

pub fn cmd_pairings_update(
    db: &Database,
    id: i64,
    patterns: Vec<String>,
    cc_account: Option<String>,
    bank_account: Option<String>,
) -> Result<()> {
    let patch = PairingPatch {
        credit_card_account_number: cc_account.map(Some),
        bank_account_number: bank_account.map(Some),
        match_patterns: (!patterns.is_empty()).then_some(patterns),
        is_active: None,
    };

    let pairing = db.update_pairing(id, &patch)?;
    db.log_audit(CLI_ACTOR, "update", Some("pairing"), Some(id), None)?;

    println!(
        "✅ Updated pairing {} (patterns: {})",
        pairing.id,
        pairing.match_patterns.join(", ")
    );
    Ok(())
}

pub fn cmd_pairings_remove(db: &Database, id: i64) -> Result<()> {
    db.deactivate_pairing(id)?;
    db.log_audit(CLI_ACTOR, "deactivate", Some("pairing"), Some(id), None)?;
    println!("✅ Deactivated pairing {}", id);
    Ok(())
}

fn print_candidates(candidates: &[SettlementCandidate]) {
    for c in candidates {
        let patterns = if c.matched_patterns.is_empty() {
            String::new()
        } else {
            format!(" [{}]", c.matched_patterns.join(", "))
        };
        println!(
            "   [{}] {} │ {:>10} │ {:<35} │ {} {:.2}{}",
            c.transaction.id,
            c.transaction.date,
            format_amount(c.transaction.amount),
            truncate(&c.transaction.description, 35),
            c.reason,
            c.confidence,
            patterns
        );
    }
}

pub fn cmd_pairings_candidates(
    db: &Database,
    config: &PipelineConfig,
    query: SettlementQuery,
) -> Result<()> {
    let finder = SettlementFinder::new(db, &config.settlement);
    let search = finder.find_settlement_candidates(&query)?;

    if search.candidates.is_empty() {
        println!("No settlement candidates in {}", query.bank_vendor);
        return Ok(());
    }

    println!();
    println!("🔎 Settlement candidates for {}", query.credit_card_vendor);
    println!("   ─────────────────────────────────────────────────────────────");
    print_candidates(&search.candidates);

    let s = &search.summary;
    println!();
    println!(
        "   {} candidates: {} debits ({:.2}), {} credits ({:.2})",
        s.total_candidates, s.debit_count, s.debit_total, s.credit_count, s.credit_total
    );

    Ok(())
}

pub fn cmd_pairings_smart_match(
    db: &Database,
    config: &PipelineConfig,
    query: SettlementQuery,
) -> Result<()> {
    let finder = SettlementFinder::new(db, &config.settlement);
    let result = finder.smart_match(&query)?;

    if result.candidates.is_empty() {
        println!("No settlement candidates in {}", query.bank_vendor);
        return Ok(());
    }

    println!();
    println!("🎯 Smart match for {}", query.credit_card_vendor);
    println!("   ─────────────────────────────────────────────────────────────");
    print_candidates(&result.candidates);

    let s = &result.summary;
    println!();
    println!(
        "   {} account-number, {} category, {} keyword matches",
        s.account_number_matches, s.category_matches, s.keyword_matches
    );
    println!(
        "   Suggested patterns: {}",
        result.suggested_patterns.join(", ")
    );

    Ok(())
}

pub fn cmd_pairings_suggest_bank(
    db: &Database,
    config: &PipelineConfig,
    cc_vendor: &str,
    cc_account: Option<&str>,
    bank_vendor: Option<&str>,
    bank_account: Option<&str>,
) -> Result<()> {
    let finder = SettlementFinder::new(db, &config.settlement);
    let Some(suggestion) =
        finder.suggest_bank_account(cc_vendor, cc_account, bank_vendor, bank_account)?
    else {
        println!("No bank account found paying {} bills", cc_vendor);
        return Ok(());
    };

    let best = &suggestion.best;
    println!();
    println!(
        "🏦 {} {} looks like it pays {}",
        best.bank_vendor,
        best.bank_account_number.as_deref().unwrap_or("*"),
        cc_vendor
    );
    println!(
        "   {} repayments, {} mention the card number, {} mention the vendor",
        best.transaction_count, best.last4_hits, best.vendor_hits
    );
    println!("   Patterns: {}", suggestion.match_patterns.join(", "));
    for sample in &suggestion.samples {
        println!(
            "     • {} {} {}",
            sample.date,
            format_amount(sample.amount),
            truncate(&sample.description, 40)
        );
    }
    for other in &suggestion.other_candidates {
        println!(
            "   Also: {} {} ({} repayments)",
            other.bank_vendor,
            other.bank_account_number.as_deref().unwrap_or("*"),
            other.transaction_count
        );
    }

    Ok(())
}

pub fn cmd_pairings_discrepancy(
    db: &Database,
    config: &PipelineConfig,
    id: i64,
    months: Option<u32>,
    as_of: NaiveDate,
) -> Result<()> {
    let pairing = db
        .get_pairing(id)?
        .ok_or_else(|| anyhow::anyhow!("Pairing {} not found", id))?;
    let months = months.unwrap_or(config.discrepancy.months_back);
    let report = analyze_discrepancy(db, &config.discrepancy, &pairing, as_of, months)?;

    println!();
    println!(
        "⚖️  Pairing {}: {} months to {}",
        id, report.months_back, report.as_of
    );
    println!("   ─────────────────────────────────────────────────────────────");

    for cycle in &report.cycles {
        let card = cycle
            .card_total
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "-".to_string());
        let diff = cycle
            .difference
            .map(|d| format!("{:+.2}", d))
            .unwrap_or_default();
        println!(
            "   {} │ bank {:>10.2} │ card {:>10} │ {:>9} │ {}",
            cycle.cycle_date, cycle.bank_total, card, diff, cycle.status
        );
    }

    println!();
    println!(
        "   Bank {:.2} vs card {:.2}: {:+.2} ({:.2}%)",
        report.total_bank, report.total_card, report.difference, report.difference_pct
    );
    println!(
        "   {} of {} cycles matched",
        report.matched_cycles, report.total_cycles
    );
    if report.exists {
        println!("⚠️  Discrepancy found. Acknowledge with 'settle pairings acknowledge {}'", id);
    } else if report.acknowledged {
        println!("   Discrepancy acknowledged");
    } else {
        println!("✅ No discrepancy");
    }

    Ok(())
}

pub fn cmd_pairings_acknowledge(db: &Database, id: i64) -> Result<()> {
    db.acknowledge_discrepancy(id)?;
    db.log_audit(CLI_ACTOR, "acknowledge", Some("pairing"), Some(id), None)?;
    println!("✅ Acknowledged discrepancy for pairing {}", id);
    Ok(())
}
