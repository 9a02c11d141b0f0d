//! Rule command implementations

use anyhow::Result;
use settle_core::db::Database;
use settle_core::models::{NewRule, RulePatch};
use settle_core::{BulkProgressCallback, BulkRuleApplier, RuleMatcher};

use super::{truncate, CLI_ACTOR};

/// Fields a `rules update` may change
#[derive(Debug, Default)]
pub struct RuleChanges {
    pub pattern: Option<String>,
    pub category: Option<String>,
    pub category_id: Option<i64>,
    pub priority: Option<i32>,
    pub active: Option<bool>,
}

pub fn cmd_rules_list(db: &Database, include_inactive: bool) -> Result<()> {
    let rules = db.list_rules(include_inactive)?;

    if rules.is_empty() {
        println!("No rules defined. Add one with:");
        println!("  settle rules add \"Cafe\" --category Dining --priority 5");
        return Ok(());
    }

    // Show in the order a name is matched against them
    let matcher = RuleMatcher::new(rules.clone());
    let ordered = matcher.rules().iter().chain(rules.iter().filter(|r| !r.is_active));

    println!();
    println!("📋 Categorization Rules");
    println!("   ─────────────────────────────────────────────────────────────");

    for rule in ordered {
        let target = match (rule.category_definition_id, rule.target_category.as_deref()) {
            (Some(id), Some(name)) => format!("{} [{}]", name, id),
            (Some(id), None) => format!("[{}]", id),
            (None, Some(name)) => name.to_string(),
            (None, None) => "-".to_string(),
        };
        let status = if rule.is_active { "" } else { " (inactive)" };
        println!(
            "   [{}] p{:<4} \"{}\" → {}{}",
            rule.id,
            rule.priority,
            truncate(&rule.name_pattern, 30),
            target,
            status
        );
    }

    Ok(())
}

pub fn cmd_rules_add(
    db: &Database,
    pattern: &str,
    category: Option<String>,
    category_id: Option<i64>,
    priority: i32,
) -> Result<()> {
    let id = db.create_rule(&NewRule {
        name_pattern: pattern.to_string(),
        target_category: category,
        category_definition_id: category_id,
        priority,
    })?;
    db.log_audit(CLI_ACTOR, "create", Some("rule"), Some(id), Some(pattern))?;

    println!("✅ Created rule {} for \"{}\" (priority {})", id, pattern, priority);
    println!("   Run 'settle apply-rules' to apply it to existing transactions.");
    Ok(())
}

pub fn cmd_rules_update(db: &Database, id: i64, changes: RuleChanges) -> Result<()> {
    let patch = RulePatch {
        name_pattern: changes.pattern,
        target_category: changes.category.map(Some),
        category_definition_id: changes.category_id.map(Some),
        priority: changes.priority,
        is_active: changes.active,
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to update");
    }

    let rule = db.update_rule(id, &patch)?;
    db.log_audit(CLI_ACTOR, "update", Some("rule"), Some(id), None)?;

    println!(
        "✅ Updated rule {} (\"{}\", priority {}, {})",
        rule.id,
        rule.name_pattern,
        rule.priority,
        if rule.is_active { "active" } else { "inactive" }
    );
    Ok(())
}

pub fn cmd_rules_delete(db: &Database, id: i64) -> Result<()> {
    db.delete_rule(id)?;
    db.log_audit(CLI_ACTOR, "delete", Some("rule"), Some(id), None)?;
    println!("✅ Deleted rule {}", id);
    Ok(())
}

pub fn cmd_rules_test(db: &Database, name: &str) -> Result<()> {
    let matcher = RuleMatcher::load(db)?;
    let matching = matcher.matching(name);

    if matching.is_empty() {
        println!("No rules match \"{}\"", name);
        return Ok(());
    }

    println!();
    println!("🔍 Rules matching \"{}\" (first wins)", name);
    for (i, rule) in matching.iter().enumerate() {
        let marker = if i == 0 { "→" } else { " " };
        println!(
            "   {} [{}] p{} \"{}\"",
            marker, rule.id, rule.priority, rule.name_pattern
        );
    }

    Ok(())
}

pub fn cmd_apply_rules(db: &Database) -> Result<()> {
    println!("⚙️  Applying categorization rules...");

    let progress: BulkProgressCallback = Box::new(|current, total| {
        tracing::debug!("Rule {}/{}", current, total);
    });
    let result = BulkRuleApplier::new(db).apply_all_with_progress(Some(&progress))?;

    db.log_audit(
        CLI_ACTOR,
        "apply_rules",
        Some("rule"),
        None,
        Some(&format!(
            "{} rules, {} transactions",
            result.rules_applied, result.transactions_updated
        )),
    )?;

    println!();
    println!("✅ Bulk pass complete");
    println!("   Rules applied:        {}", result.rules_applied);
    println!("   Transactions updated: {}", result.transactions_updated);

    if !result.failed_rules.is_empty() {
        println!();
        println!("⚠️  {} rules failed:", result.failed_rules.len());
        for failure in &result.failed_rules {
            println!(
                "   [{}] \"{}\": {}",
                failure.rule_id, failure.pattern, failure.error
            );
        }
    }

    Ok(())
}
