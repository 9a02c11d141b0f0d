//! Merchant catalog matcher
//!
//! Catalog entries are curated merchant-name fragments. A fragment covering a
//! larger share of the name is more trustworthy, so the curator's confidence
//! is scaled by coverage and never exceeds it.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::categories::CategoryResolver;
use crate::db::Database;
use crate::error::Result;
use crate::models::{CategoryMatch, CategorySource, CategoryType, MerchantCatalogEntry};

/// Most candidates returned for one name
pub const MAX_CANDIDATES: usize = 5;

/// Coverage at which a fragment earns the full catalog confidence
const COVERAGE_BOOST: f64 = 1.5;

/// Collapse whitespace runs, trim, and strip surrounding quote and star characters
pub fn clean_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c| matches!(c, '*' | '"' | '\''))
        .trim()
        .to_string()
}

/// `catalog_confidence × min(1, 1.5 × pattern_len / name_len)`
pub fn scaled_confidence(catalog_confidence: f64, pattern_len: usize, name_len: usize) -> f64 {
    if name_len == 0 {
        return 0.0;
    }
    let coverage = (COVERAGE_BOOST * pattern_len as f64 / name_len as f64).min(1.0);
    (catalog_confidence.clamp(0.0, 1.0) * coverage).max(0.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCandidate {
    pub entry: MerchantCatalogEntry,
    /// Coverage-scaled confidence
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogMatcher {
    entries: Vec<(MerchantCatalogEntry, String)>,
}

impl CatalogMatcher {
    pub fn new(entries: Vec<MerchantCatalogEntry>) -> Self {
        let mut entries: Vec<(MerchantCatalogEntry, String)> = entries
            .into_iter()
            .filter(|e| e.is_active)
            .map(|e| {
                let lowered = e.merchant_pattern.trim().to_lowercase();
                (e, lowered)
            })
            .filter(|(_, p)| !p.is_empty())
            .collect();

        // Longest fragment first, then the curator's confidence
        entries.sort_by(|(a, pa), (b, pb)| {
            Reverse(pa.chars().count())
                .cmp(&Reverse(pb.chars().count()))
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        Self { entries }
    }

    /// Load the active catalog
    pub fn load(db: &Database) -> Result<Self> {
        Ok(Self::new(db.list_catalog_entries(false)?))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to [`MAX_CANDIDATES`] entries matching the cleaned name
    pub fn candidates(&self, name: &str) -> Vec<CatalogCandidate> {
        let cleaned = clean_name(name).to_lowercase();
        let name_len = cleaned.chars().count();
        if name_len == 0 {
            return Vec::new();
        }

        self.entries
            .iter()
            .filter(|(_, pattern)| cleaned.contains(pattern.as_str()))
            .take(MAX_CANDIDATES)
            .map(|(entry, pattern)| CatalogCandidate {
                entry: entry.clone(),
                confidence: scaled_confidence(entry.confidence, pattern.chars().count(), name_len),
            })
            .collect()
    }

    pub fn best(&self, name: &str) -> Option<CatalogCandidate> {
        self.candidates(name).into_iter().next()
    }
}

/// The classification a catalog candidate assigns
///
/// The subcategory is looked up under its parent, falling back to the parent
/// alone. An unknown category keeps the catalog label as free text.
pub fn resolve_catalog_category(
    resolver: &CategoryResolver,
    candidate: &CatalogCandidate,
) -> Result<CategoryMatch> {
    let entry = &candidate.entry;
    let parent = entry.parent_category.trim();
    let subcategory = entry
        .subcategory
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let resolved = match subcategory {
        Some(sub) => match resolver.resolve_by_name(sub, Some(parent))? {
            Some(found) => Some(found),
            None => resolver.resolve_by_name(parent, None)?,
        },
        None => resolver.resolve_by_name(parent, None)?,
    };

    let (category_definition_id, category, category_type) = match resolved {
        Some(found) => (Some(found.id), found.name, found.category_type),
        None => (
            None,
            subcategory.unwrap_or(parent).to_string(),
            CategoryType::Expense,
        ),
    };

    Ok(CategoryMatch {
        category_definition_id,
        category,
        category_type,
        confidence: candidate.confidence,
        source: CategorySource::Catalog,
        rule_id: None,
        catalog_entry_id: Some(entry.id),
    })
}
