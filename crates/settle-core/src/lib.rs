//! Settle Core Library
//!
//! Transaction normalization pipeline for bank and credit card ledgers:
//! - Database access and migrations
//! - Category tree resolution with a session cache
//! - Priority-ordered categorization rules
//! - Merchant catalog confidence scoring
//! - Settlement pairing and discrepancy analysis
//! - Smart-match candidate search for new pairings
//! - Bulk rule application with cancellation

pub mod bulk;
pub mod catalog;
pub mod categories;
pub mod categorize;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod rules;
pub mod settlement;
pub mod smart_match;

pub use bulk::{BulkApplyResult, BulkProgressCallback, BulkRuleApplier, CancellationFlag, RuleFailure};
pub use catalog::{clean_name, CatalogCandidate, CatalogMatcher};
pub use categories::CategoryResolver;
pub use categorize::{
    derive_external_id, read_raw_csv, CategorizeRequest, CategorizeResult, Categorizer,
    IngestStats,
};
pub use config::{DiscrepancyConfig, PipelineConfig, SettlementConfig};
pub use db::{AuditEntry, Database, TransactionInsertResult};
pub use error::{Error, Result};
pub use rules::{RuleMatcher, RULE_CONFIDENCE};
pub use settlement::{
    analyze_discrepancy, is_settlement, pairing_for_transaction, CycleStatus, DiscrepancyReport,
};
pub use smart_match::{
    BankAccountSuggestion, CandidateSearch, MatchReason, SettlementCandidate, SettlementFinder,
    SettlementQuery, SmartMatchResult,
};
