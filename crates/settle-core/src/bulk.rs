//! Bulk rule applier
//!
//! Re-runs every active rule over the ledger. Rules run one at a time in match
//! order, each inside its own SQLite transaction, so a failed or cancelled
//! pass leaves a consistent state that can simply be run again.
//!
//! A row is only ever upgraded:
//! - manual overrides and income rows are never touched
//! - rows classified above [`RULE_CONFIDENCE`] are left alone
//! - a row owned by a rule ranked at or above the current one is not re-claimed
//!   while that rule's pattern still matches it, unless it is the current rule
//!   and its category changed

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::categories::CategoryResolver;
use crate::db::{load_claimable, write_category_match, ClaimableRow, Database};
use crate::error::Result;
use crate::models::{CategorizationRule, CategoryMatch};
use crate::rules::{pattern_matches, resolve_rule_category, RuleMatcher, RULE_CONFIDENCE};

/// Progress callback type for bulk passes: (current_rule, total_rules)
pub type BulkProgressCallback = Box<dyn Fn(i64, i64) + Send + Sync>;

/// Cooperative cancellation shared between a pass and its controller
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFailure {
    pub rule_id: i64,
    pub pattern: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkApplyResult {
    pub rules_applied: i64,
    pub transactions_updated: i64,
    pub failed_rules: Vec<RuleFailure>,
    pub cancelled: bool,
}

/// Whether `rule` should overwrite the row's current classification
fn should_claim(
    row: &ClaimableRow,
    rule: &CategorizationRule,
    category: &CategoryMatch,
    ranked_ahead: &HashMap<i64, &CategorizationRule>,
) -> bool {
    if row.confidence_score < RULE_CONFIDENCE {
        return true;
    }
    match row.matched_rule_id {
        Some(owner) if owner == rule.id => {
            row.category_definition_id != category.category_definition_id
                || row.category.as_deref() != Some(category.category.as_str())
        }
        // an owner that no longer matches has given the row up
        Some(owner) => match ranked_ahead.get(&owner) {
            Some(ahead) => !pattern_matches(&ahead.name_pattern, &row.description),
            None => true,
        },
        None => true,
    }
}

pub struct BulkRuleApplier<'a> {
    db: &'a Database,
    cancel: CancellationFlag,
}

impl<'a> BulkRuleApplier<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_cancellation(db, CancellationFlag::new())
    }

    pub fn with_cancellation(db: &'a Database, cancel: CancellationFlag) -> Self {
        Self { db, cancel }
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Apply every active rule
    pub fn apply_all(&self) -> Result<BulkApplyResult> {
        self.apply_all_with_progress(None)
    }

    /// Apply every active rule, reporting progress per rule
    pub fn apply_all_with_progress(
        &self,
        progress: Option<&BulkProgressCallback>,
    ) -> Result<BulkApplyResult> {
        let matcher = RuleMatcher::load(self.db)?;
        let resolver = CategoryResolver::new(self.db);
        let rules = matcher.rules();
        let total = rules.len() as i64;

        let mut result = BulkApplyResult::default();
        let mut ranked_ahead: HashMap<i64, &CategorizationRule> = HashMap::new();

        for (index, rule) in rules.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Bulk pass cancelled after {} of {} rules", index, total);
                result.cancelled = true;
                break;
            }
            if let Some(cb) = progress {
                cb(index as i64 + 1, total);
            }
            ranked_ahead.insert(rule.id, rule);

            let outcome = resolve_rule_category(&resolver, rule)
                .and_then(|category| self.apply_rule(rule, &category, &ranked_ahead));

            match outcome {
                Ok(updated) => {
                    debug!("Rule {} ('{}') updated {} rows", rule.id, rule.name_pattern, updated);
                    result.rules_applied += 1;
                    result.transactions_updated += updated;
                }
                Err(e) => {
                    warn!("Skipping rule {} ('{}'): {}", rule.id, rule.name_pattern, e);
                    result.failed_rules.push(RuleFailure {
                        rule_id: rule.id,
                        pattern: rule.name_pattern.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Bulk pass: {} rules applied, {} transactions updated, {} failed",
            result.rules_applied,
            result.transactions_updated,
            result.failed_rules.len()
        );
        Ok(result)
    }

    /// One rule, one SQLite transaction
    fn apply_rule(
        &self,
        rule: &CategorizationRule,
        category: &CategoryMatch,
        ranked_ahead: &HashMap<i64, &CategorizationRule>,
    ) -> Result<i64> {
        self.db.with_transaction(|conn| {
            let mut updated = 0i64;
            for row in load_claimable(conn, RULE_CONFIDENCE)? {
                if !pattern_matches(&rule.name_pattern, &row.description) {
                    continue;
                }
                if should_claim(&row, rule, category, ranked_ahead) {
                    updated += write_category_match(conn, row.id, category)? as i64;
                }
            }
            Ok(updated)
        })
    }
}
