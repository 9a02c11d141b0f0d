//! Chained categorizer and ingestion
//!
//! Resolution order for a transaction name:
//! 1. Categorization rule (fixed confidence)
//! 2. Merchant catalog (coverage-scaled confidence)
//! 3. Legacy lookup of the upstream free-text category by name
//! 4. Uncategorized

use std::io::Read;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::catalog::{clean_name, resolve_catalog_category, CatalogMatcher};
use crate::categories::CategoryResolver;
use crate::db::{Database, TransactionInsertResult};
use crate::error::{Error, Result};
use crate::models::{CategoryMatch, CategorySource, CategoryType, RawTransaction, Transaction};
use crate::rules::{resolve_rule_category, RuleMatcher};

/// Confidence of a legacy name lookup
pub const NAME_LOOKUP_CONFIDENCE: f64 = 0.75;

/// Most alternatives reported by [`Categorizer::categorize_one`]
pub const MAX_ALTERNATIVES: usize = 5;

/// Ingestion statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub inserted: i64,
    pub duplicates: i64,
    pub categorized: i64,
    pub uncategorized: i64,
}

/// Categorize one name, optionally committing to a stored transaction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorizeRequest {
    pub name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub raw_category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizeResult {
    pub best: Option<CategoryMatch>,
    pub confidence: f64,
    pub alternatives: Vec<CategoryMatch>,
    pub transaction_id: Option<i64>,
    /// The best match was written to the target transaction
    pub committed: bool,
}

/// Stable identity for rows the upstream source did not give one
pub fn derive_external_id(raw: &RawTransaction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.vendor.as_bytes());
    hasher.update(b"|");
    hasher.update(raw.date.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(raw.description.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{:.2}", raw.amount).as_bytes());
    hasher.update(b"|");
    hasher.update(raw.account_number.as_deref().unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Read raw rows from CSV whose headers match the [`RawTransaction`] fields
pub fn read_raw_csv<R: Read>(reader: R) -> Result<Vec<RawTransaction>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        let row: RawTransaction = record?;
        rows.push(row);
    }
    Ok(rows)
}

/// Whether committing `candidate` over the current classification would be a downgrade
fn is_upgrade(current: &Transaction, candidate: &CategoryMatch) -> bool {
    if current.manual_override {
        return false;
    }
    if current.category_type == Some(CategoryType::Income)
        && candidate.category_type != CategoryType::Income
    {
        return false;
    }
    candidate.confidence >= current.confidence_score
}

/// One categorizer with an explicit fallback order
pub struct Categorizer<'a> {
    db: &'a Database,
    resolver: CategoryResolver<'a>,
    rules: RuleMatcher,
    catalog: CatalogMatcher,
}

impl<'a> Categorizer<'a> {
    /// Load the active rules and catalog
    pub fn new(db: &'a Database) -> Result<Self> {
        Ok(Self {
            db,
            resolver: CategoryResolver::new(db),
            rules: RuleMatcher::load(db)?,
            catalog: CatalogMatcher::load(db)?,
        })
    }

    pub fn resolver(&self) -> &CategoryResolver<'a> {
        &self.resolver
    }

    pub fn rules(&self) -> &RuleMatcher {
        &self.rules
    }

    /// First rule match whose category resolves
    ///
    /// A rule pointing at a missing category is skipped in favour of the next one.
    fn rule_match(&self, name: &str) -> Result<Option<CategoryMatch>> {
        for rule in self.rules.matching(name) {
            match resolve_rule_category(&self.resolver, rule) {
                Ok(m) => return Ok(Some(m)),
                Err(Error::NotFound(msg)) => {
                    warn!("Skipping rule {} ('{}'): {}", rule.id, rule.name_pattern, msg)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn catalog_match(&self, name: &str) -> Result<Option<CategoryMatch>> {
        match self.catalog.best(name) {
            Some(candidate) => Ok(Some(resolve_catalog_category(&self.resolver, &candidate)?)),
            None => Ok(None),
        }
    }

    fn name_match(&self, raw_category: Option<&str>) -> Result<Option<CategoryMatch>> {
        let Some(raw) = raw_category.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        Ok(self.resolver.resolve_by_name(raw, None)?.map(|found| CategoryMatch {
            category_definition_id: Some(found.id),
            category: found.name,
            category_type: found.category_type,
            confidence: NAME_LOOKUP_CONFIDENCE,
            source: CategorySource::Name,
            rule_id: None,
            catalog_entry_id: None,
        }))
    }

    /// Resolve a category for a name; `None` means uncategorized
    pub fn resolve_category(
        &self,
        raw_category: Option<&str>,
        name: &str,
    ) -> Result<Option<CategoryMatch>> {
        if let Some(m) = self.rule_match(name)? {
            debug!("'{}' → rule {:?} ({})", name, m.rule_id, m.category);
            return Ok(Some(m));
        }
        if let Some(m) = self.catalog_match(name)? {
            debug!("'{}' → catalog {:?} ({})", name, m.catalog_entry_id, m.category);
            return Ok(Some(m));
        }
        if let Some(m) = self.name_match(raw_category)? {
            debug!("'{}' → name lookup ({})", name, m.category);
            return Ok(Some(m));
        }
        debug!("'{}' → uncategorized", name);
        Ok(None)
    }

    /// Ingest one raw row, categorizing it on the way in
    pub fn ingest(&self, raw: &RawTransaction) -> Result<TransactionInsertResult> {
        self.ingest_inner(raw).map(|(result, _)| result)
    }

    fn ingest_inner(
        &self,
        raw: &RawTransaction,
    ) -> Result<(TransactionInsertResult, Option<CategoryMatch>)> {
        if raw.vendor.trim().is_empty() {
            return Err(Error::Validation("Transaction vendor is required".into()));
        }

        let mut row = raw.clone();
        if row.external_id.trim().is_empty() {
            row.external_id = derive_external_id(raw);
        }

        let merchant = clean_name(&row.description);
        let categorization = self.resolve_category(row.raw_category.as_deref(), &row.description)?;
        let merchant = (!merchant.is_empty()).then_some(merchant.as_str());

        let result = self
            .db
            .insert_transaction(&row, merchant, categorization.as_ref())?;
        Ok((result, categorization))
    }

    /// Ingest many rows; duplicates are counted, not errors
    pub fn ingest_batch(&self, rows: &[RawTransaction]) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        for raw in rows {
            match self.ingest_inner(raw)? {
                (TransactionInsertResult::Inserted(_), Some(_)) => {
                    stats.inserted += 1;
                    stats.categorized += 1;
                }
                (TransactionInsertResult::Inserted(_), None) => {
                    stats.inserted += 1;
                    stats.uncategorized += 1;
                }
                (TransactionInsertResult::Duplicate(id), _) => {
                    debug!("Skipping duplicate transaction {}", id);
                    stats.duplicates += 1;
                }
            }
        }

        info!(
            "Ingested {} rows ({} duplicates, {} categorized, {} uncategorized)",
            stats.inserted, stats.duplicates, stats.categorized, stats.uncategorized
        );
        Ok(stats)
    }

    /// Categorize a name and report alternatives
    ///
    /// When both an external ID and a vendor are given, the best match is
    /// committed to that transaction unless that would downgrade it.
    pub fn categorize_one(&self, request: &CategorizeRequest) -> Result<CategorizeResult> {
        let target = match (request.external_id.as_deref(), request.vendor.as_deref()) {
            (Some(external_id), Some(vendor)) => Some(
                self.db
                    .find_transaction(external_id, vendor)?
                    .ok_or_else(|| {
                        Error::NotFound(format!("Transaction {} from {}", external_id, vendor))
                    })?,
            ),
            _ => None,
        };

        let best = self.resolve_category(request.raw_category.as_deref(), &request.name)?;
        let alternatives = self.alternatives(&request.name, best.as_ref())?;

        let mut committed = false;
        if let (Some(tx), Some(m)) = (&target, &best) {
            if is_upgrade(tx, m) {
                committed = self.db.apply_category_match(tx.id, m)?;
            } else {
                debug!(
                    "Not committing {} to transaction {} (manual={}, current confidence {})",
                    m.category, tx.id, tx.manual_override, tx.confidence_score
                );
            }
        }

        Ok(CategorizeResult {
            confidence: best.as_ref().map(|m| m.confidence).unwrap_or(0.0),
            best,
            alternatives,
            transaction_id: target.map(|t| t.id),
            committed,
        })
    }

    /// Other matching rules, then catalog candidates, excluding the best match
    fn alternatives(
        &self,
        name: &str,
        best: Option<&CategoryMatch>,
    ) -> Result<Vec<CategoryMatch>> {
        let mut out: Vec<CategoryMatch> = Vec::new();
        let is_best = |m: &CategoryMatch| {
            best.is_some_and(|b| {
                b.source == m.source && b.rule_id == m.rule_id && b.catalog_entry_id == m.catalog_entry_id
            })
        };

        for rule in self.rules.matching(name) {
            if let Ok(m) = resolve_rule_category(&self.resolver, rule) {
                if !is_best(&m) {
                    out.push(m);
                }
            }
        }
        for candidate in self.catalog.candidates(name) {
            let m = resolve_catalog_category(&self.resolver, &candidate)?;
            if !is_best(&m) {
                out.push(m);
            }
        }

        out.truncate(MAX_ALTERNATIVES);
        Ok(out)
    }
}
