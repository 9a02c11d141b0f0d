//! Domain models for the ledger, category tree, rules, catalog and pairings

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Deserialize a field that distinguishes "absent" from "explicitly null"
///
/// Absent → `None`, `null` → `Some(None)`, value → `Some(Some(v))`.
fn double_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// ========== Enums ==========

/// Top-level classification of money flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Expense,
    Income,
    Investment,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Investment => "investment",
        }
    }
}

impl std::str::FromStr for CategoryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            "investment" => Ok(Self::Investment),
            _ => Err(format!("Unknown category type: {}", s)),
        }
    }
}

impl std::fmt::Display for CategoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a transaction's current category was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySource {
    /// Matched a user-authored categorization rule
    Rule,
    /// Matched a merchant catalog entry
    Catalog,
    /// Legacy lookup of the upstream free-text category by name
    Name,
    /// Set by the user; never touched by automatic passes
    Manual,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Catalog => "catalog",
            Self::Name => "name",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for CategorySource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rule" => Ok(Self::Rule),
            "catalog" => Ok(Self::Catalog),
            "name" => Ok(Self::Name),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown category source: {}", s)),
        }
    }
}

impl std::fmt::Display for CategorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Pending,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "completed" => Ok(Self::Completed),
            "pending" => Ok(Self::Pending),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

// ========== Ledger ==========

/// A ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub external_id: String,
    pub vendor: String,
    pub date: NaiveDate,
    /// Billing date on the card side, when the upstream row carries one
    pub processed_date: Option<NaiveDate>,
    pub description: String,
    /// Negative = expense
    pub amount: f64,
    /// Free-text category supplied by the upstream source
    pub raw_category: Option<String>,
    pub category_definition_id: Option<i64>,
    /// Display label of the assigned category
    pub category: Option<String>,
    pub category_type: Option<CategoryType>,
    pub merchant_name: Option<String>,
    pub auto_categorized: bool,
    pub confidence_score: f64,
    pub category_source: Option<CategorySource>,
    pub matched_rule_id: Option<i64>,
    pub manual_override: bool,
    pub account_number: Option<String>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Raw row handed over by the upstream scraper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    /// May be empty; a stable id is derived from the row contents when missing
    #[serde(default)]
    pub external_id: String,
    pub vendor: String,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub raw_category: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub processed_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
}

/// A resolved classification ready to be written to a ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub category_definition_id: Option<i64>,
    /// Label written to the transaction (definition name or legacy free text)
    pub category: String,
    pub category_type: CategoryType,
    pub confidence: f64,
    pub source: CategorySource,
    /// Rule that produced the match, when `source` is `Rule`
    pub rule_id: Option<i64>,
    /// Catalog entry that produced the match, when `source` is `Catalog`
    pub catalog_entry_id: Option<i64>,
}

// ========== Category Tree ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub id: i64,
    pub name: String,
    /// Localized (English) name
    pub name_en: Option<String>,
    pub parent_id: Option<i64>,
    pub category_type: CategoryType,
    pub is_active: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub name_en: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub category_type: CategoryType,
    #[serde(default)]
    pub display_order: i32,
}

impl NewCategory {
    pub fn validate(&self) -> Result<()> {
        if non_blank(Some(&self.name)).is_none() {
            return Err(Error::Validation("Category name is required".into()));
        }
        Ok(())
    }
}

/// Partial update for a category definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub name_en: Option<Option<String>>,
    /// `Some(None)` detaches the category to the root level
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<i64>>,
    #[serde(default)]
    pub category_type: Option<CategoryType>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub display_order: Option<i32>,
}

impl CategoryPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.name_en.is_none()
            && self.parent_id.is_none()
            && self.category_type.is_none()
            && self.is_active.is_none()
            && self.display_order.is_none()
    }

    /// Merge the patch into an existing definition
    pub fn apply_to(&self, category: &mut CategoryDefinition) -> Result<()> {
        if let Some(name) = &self.name {
            let name = non_blank(Some(name))
                .ok_or_else(|| Error::Validation("Category name cannot be blank".into()))?;
            category.name = name.to_string();
        }
        if let Some(name_en) = &self.name_en {
            category.name_en = non_blank(name_en.as_deref()).map(str::to_string);
        }
        if let Some(parent_id) = self.parent_id {
            category.parent_id = parent_id;
        }
        if let Some(category_type) = self.category_type {
            category.category_type = category_type;
        }
        if let Some(is_active) = self.is_active {
            category.is_active = is_active;
        }
        if let Some(display_order) = self.display_order {
            category.display_order = display_order;
        }
        Ok(())
    }
}

/// Category as seen by the resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCategory {
    pub id: i64,
    pub name: String,
    pub category_type: CategoryType,
    pub parent_id: Option<i64>,
    pub parent_name: Option<String>,
}

/// Root category with its children
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: CategoryDefinition,
    pub children: Vec<CategoryDefinition>,
}

// ========== Categorization Rules ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationRule {
    pub id: i64,
    /// Case-insensitive substring matched against the transaction name
    pub name_pattern: String,
    /// Legacy free-text target
    pub target_category: Option<String>,
    pub category_definition_id: Option<i64>,
    /// Higher wins
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CategorizationRule {
    /// Specificity used as tie-break at equal priority
    pub fn pattern_len(&self) -> usize {
        self.name_pattern.chars().count()
    }

    fn validate(&self) -> Result<()> {
        validate_rule_fields(
            &self.name_pattern,
            self.target_category.as_deref(),
            self.category_definition_id,
        )
    }
}

fn validate_rule_fields(
    pattern: &str,
    target_category: Option<&str>,
    category_definition_id: Option<i64>,
) -> Result<()> {
    if non_blank(Some(pattern)).is_none() {
        return Err(Error::Validation("Rule pattern is required".into()));
    }
    if non_blank(target_category).is_none() && category_definition_id.is_none() {
        return Err(Error::Validation(
            "Rule needs a category reference or a target category".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    pub name_pattern: String,
    #[serde(default)]
    pub target_category: Option<String>,
    #[serde(default)]
    pub category_definition_id: Option<i64>,
    #[serde(default)]
    pub priority: i32,
}

impl NewRule {
    pub fn validate(&self) -> Result<()> {
        validate_rule_fields(
            &self.name_pattern,
            self.target_category.as_deref(),
            self.category_definition_id,
        )
    }
}

/// Partial update for a rule
///
/// Every field is optional; nullable columns use a double option so that
/// `null` clears the value while an absent field leaves it untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePatch {
    #[serde(default)]
    pub name_pattern: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_category: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub category_definition_id: Option<Option<i64>>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.name_pattern.is_none()
            && self.target_category.is_none()
            && self.category_definition_id.is_none()
            && self.priority.is_none()
            && self.is_active.is_none()
    }

    /// Merge the patch into a rule and validate the result
    pub fn apply_to(&self, rule: &mut CategorizationRule) -> Result<()> {
        if let Some(pattern) = &self.name_pattern {
            rule.name_pattern = pattern.trim().to_string();
        }
        if let Some(target) = &self.target_category {
            rule.target_category = non_blank(target.as_deref()).map(str::to_string);
        }
        if let Some(category_id) = self.category_definition_id {
            rule.category_definition_id = category_id;
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(is_active) = self.is_active {
            rule.is_active = is_active;
        }
        rule.validate()
    }
}

// ========== Merchant Catalog ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantCatalogEntry {
    pub id: i64,
    pub merchant_pattern: String,
    pub parent_category: String,
    pub subcategory: Option<String>,
    /// Curator confidence in [0, 1]
    pub confidence: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCatalogEntry {
    pub merchant_pattern: String,
    pub parent_category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub confidence: f64,
}

impl NewCatalogEntry {
    pub fn validate(&self) -> Result<()> {
        if non_blank(Some(&self.merchant_pattern)).is_none() {
            return Err(Error::Validation("Merchant pattern is required".into()));
        }
        if non_blank(Some(&self.parent_category)).is_none() {
            return Err(Error::Validation("Parent category is required".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::Validation(format!(
                "Catalog confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

// ========== Account Pairings ==========

/// Declared link between a credit card account and the bank account that settles it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPairing {
    pub id: i64,
    pub credit_card_vendor: String,
    pub credit_card_account_number: Option<String>,
    pub bank_vendor: String,
    /// `None` matches every account of the bank vendor
    pub bank_account_number: Option<String>,
    /// Substrings identifying settlement transactions (never empty)
    pub match_patterns: Vec<String>,
    pub is_active: bool,
    pub discrepancy_acknowledged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccountPairing {
    pub credit_card_vendor: String,
    #[serde(default)]
    pub credit_card_account_number: Option<String>,
    pub bank_vendor: String,
    #[serde(default)]
    pub bank_account_number: Option<String>,
    #[serde(default)]
    pub match_patterns: Vec<String>,
}

impl NewAccountPairing {
    /// Validate and return the normalized pattern list
    pub fn validate(&self) -> Result<Vec<String>> {
        if non_blank(Some(&self.credit_card_vendor)).is_none() {
            return Err(Error::Validation("Credit card vendor is required".into()));
        }
        if non_blank(Some(&self.bank_vendor)).is_none() {
            return Err(Error::Validation("Bank vendor is required".into()));
        }
        let patterns = normalize_patterns(&self.match_patterns);
        if patterns.is_empty() {
            return Err(Error::Validation(
                "Pairing needs at least one match pattern".into(),
            ));
        }
        Ok(patterns)
    }
}

/// Partial update for a pairing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairingPatch {
    #[serde(default, deserialize_with = "double_option")]
    pub credit_card_account_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bank_account_number: Option<Option<String>>,
    #[serde(default)]
    pub match_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl PairingPatch {
    pub fn apply_to(&self, pairing: &mut AccountPairing) -> Result<()> {
        if let Some(account) = &self.credit_card_account_number {
            pairing.credit_card_account_number = non_blank(account.as_deref()).map(str::to_string);
        }
        if let Some(account) = &self.bank_account_number {
            pairing.bank_account_number = non_blank(account.as_deref()).map(str::to_string);
        }
        if let Some(patterns) = &self.match_patterns {
            let patterns = normalize_patterns(patterns);
            if patterns.is_empty() {
                return Err(Error::Validation(
                    "Pairing needs at least one match pattern".into(),
                ));
            }
            pairing.match_patterns = patterns;
        }
        if let Some(is_active) = self.is_active {
            pairing.is_active = is_active;
        }
        Ok(())
    }
}

/// Trim, drop blanks and de-duplicate while keeping order
pub fn normalize_patterns(patterns: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for pattern in patterns {
        let trimmed = pattern.trim();
        if trimmed.is_empty() || out.iter().any(|p| p == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

// ========== Reports ==========

/// Expense total for one calendar month, with settlements excluded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyExpenseReport {
    /// "YYYY-MM"
    pub period: String,
    /// Sum of counted expenses (negative)
    pub total: f64,
    pub transaction_count: i64,
    pub excluded_settlements: i64,
    /// Sum of excluded settlement amounts (negative)
    pub excluded_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpending {
    pub category_definition_id: Option<i64>,
    pub category: String,
    /// Positive magnitude of expenses
    pub amount: f64,
    pub transaction_count: i64,
}
