//! Categorization rule matcher
//!
//! Rules are case-insensitive substrings of the transaction name. Ordering is
//! priority first, then specificity (longer pattern), then ID, so the same
//! rule set always yields the same winner.

use std::cmp::Reverse;

use crate::categories::CategoryResolver;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{CategorizationRule, CategoryMatch, CategorySource, CategoryType};

/// Confidence assigned to every rule match
pub const RULE_CONFIDENCE: f64 = 0.8;

/// Case-insensitive substring match; a blank pattern never matches
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.trim();
    !pattern.is_empty() && name.to_lowercase().contains(&pattern.to_lowercase())
}

/// Active rules in match order
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<CategorizationRule>,
    lowered: Vec<String>,
}

impl RuleMatcher {
    pub fn new(rules: Vec<CategorizationRule>) -> Self {
        let mut rules: Vec<CategorizationRule> = rules
            .into_iter()
            .filter(|r| r.is_active && !r.name_pattern.trim().is_empty())
            .collect();
        rules.sort_by_key(|r| (Reverse(r.priority), Reverse(r.pattern_len()), r.id));

        let lowered = rules
            .iter()
            .map(|r| r.name_pattern.trim().to_lowercase())
            .collect();
        Self { rules, lowered }
    }

    /// Load the active rule set
    pub fn load(db: &Database) -> Result<Self> {
        Ok(Self::new(db.list_active_rules()?))
    }

    /// Rules in match order
    pub fn rules(&self) -> &[CategorizationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The winning rule for a name
    pub fn match_name(&self, name: &str) -> Option<&CategorizationRule> {
        let name = name.to_lowercase();
        self.lowered
            .iter()
            .position(|p| name.contains(p.as_str()))
            .map(|i| &self.rules[i])
    }

    /// Every rule matching a name, in match order
    pub fn matching(&self, name: &str) -> Vec<&CategorizationRule> {
        let name = name.to_lowercase();
        self.rules
            .iter()
            .zip(&self.lowered)
            .filter(|(_, p)| name.contains(p.as_str()))
            .map(|(r, _)| r)
            .collect()
    }
}

/// The classification a rule assigns
///
/// A rule's category reference must point to an active category. Without one,
/// the legacy target is looked up by name and kept as free text when unknown.
pub fn resolve_rule_category(
    resolver: &CategoryResolver,
    rule: &CategorizationRule,
) -> Result<CategoryMatch> {
    let (category_definition_id, category, category_type) = match rule.category_definition_id {
        Some(id) => {
            let resolved = resolver.resolve_by_id(id).map_err(|e| match e {
                Error::NotFound(msg) => {
                    Error::NotFound(format!("Rule {} targets a missing category: {}", rule.id, msg))
                }
                other => other,
            })?;
            (Some(resolved.id), resolved.name, resolved.category_type)
        }
        None => {
            let target = rule
                .target_category
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    Error::Validation(format!("Rule {} has no category target", rule.id))
                })?;
            match resolver.resolve_by_name(target, None)? {
                Some(resolved) => (Some(resolved.id), resolved.name, resolved.category_type),
                None => (None, target.to_string(), CategoryType::Expense),
            }
        }
    };

    Ok(CategoryMatch {
        category_definition_id,
        category,
        category_type,
        confidence: RULE_CONFIDENCE,
        source: CategorySource::Rule,
        rule_id: Some(rule.id),
        catalog_entry_id: None,
    })
}
