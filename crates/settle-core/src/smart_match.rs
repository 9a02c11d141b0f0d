//! Smart-match candidate finder
//!
//! Scans a bank account for transactions that look like settlements of a
//! given credit card, to help the user set up an [`AccountPairing`].
//!
//! [`AccountPairing`]: crate::models::AccountPairing

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SettlementConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{normalize_patterns, Transaction};
use crate::settlement::{
    account_last4, build_match_patterns, contains_ci, extract_digit_sequences, is_card_vendor,
    is_repayment_category, name_contains_vendor, vendor_keywords, REPAYMENT_CATEGORY_NAMES,
};

/// Extra confidence per additional distinct matched pattern
const PATTERN_BONUS: f64 = 0.05;
const MAX_CONFIDENCE: f64 = 0.99;
const MAX_SAMPLES: usize = 3;
const MAX_OTHER_ACCOUNTS: usize = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementQuery {
    pub credit_card_vendor: String,
    #[serde(default)]
    pub credit_card_account_number: Option<String>,
    pub bank_vendor: String,
    #[serde(default)]
    pub bank_account_number: Option<String>,
    #[serde(default)]
    pub card_nickname: Option<String>,
    #[serde(default)]
    pub card_last4: Option<String>,
}

impl SettlementQuery {
    fn validate(&self) -> Result<()> {
        if self.credit_card_vendor.trim().is_empty() {
            return Err(Error::Validation("Credit card vendor is required".into()));
        }
        if self.bank_vendor.trim().is_empty() {
            return Err(Error::Validation("Bank vendor is required".into()));
        }
        Ok(())
    }
}

/// Why a transaction was picked, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    AccountNumberMatch,
    CategoryMatch,
    KeywordMatch,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountNumberMatch => "account_number_match",
            Self::CategoryMatch => "category_match",
            Self::KeywordMatch => "keyword_match",
        }
    }

    fn strength(&self) -> u8 {
        match self {
            Self::AccountNumberMatch => 3,
            Self::CategoryMatch => 2,
            Self::KeywordMatch => 1,
        }
    }

    fn base_confidence(&self) -> f64 {
        match self {
            Self::AccountNumberMatch => 0.9,
            Self::CategoryMatch => 0.7,
            Self::KeywordMatch => 0.4,
        }
    }
}

impl std::fmt::Display for MatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementCandidate {
    pub transaction: Transaction,
    pub reason: MatchReason,
    pub confidence: f64,
    /// Description substrings that matched
    pub matched_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub total_candidates: usize,
    pub debit_count: usize,
    /// Magnitude
    pub debit_total: f64,
    pub credit_count: usize,
    pub credit_total: f64,
    pub account_number_matches: usize,
    pub category_matches: usize,
    pub keyword_matches: usize,
}

impl CandidateSummary {
    fn from_candidates(candidates: &[SettlementCandidate]) -> Self {
        let mut summary = Self {
            total_candidates: candidates.len(),
            ..Default::default()
        };
        for candidate in candidates {
            let amount = candidate.transaction.amount;
            if amount < 0.0 {
                summary.debit_count += 1;
                summary.debit_total += -amount;
            } else {
                summary.credit_count += 1;
                summary.credit_total += amount;
            }
            match candidate.reason {
                MatchReason::AccountNumberMatch => summary.account_number_matches += 1,
                MatchReason::CategoryMatch => summary.category_matches += 1,
                MatchReason::KeywordMatch => summary.keyword_matches += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSearch {
    pub candidates: Vec<SettlementCandidate>,
    pub summary: CandidateSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartMatchResult {
    pub candidates: Vec<SettlementCandidate>,
    pub summary: CandidateSummary,
    /// Ready-to-use pairing patterns
    pub suggested_patterns: Vec<String>,
}

/// A (vendor, account) group of repayment-like bank debits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccountCandidate {
    pub bank_vendor: String,
    pub bank_account_number: Option<String>,
    pub last4_hits: usize,
    pub vendor_hits: usize,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccountSuggestion {
    pub best: BankAccountCandidate,
    pub match_patterns: Vec<String>,
    pub samples: Vec<Transaction>,
    pub other_candidates: Vec<BankAccountCandidate>,
}

/// Patterns derived from a query
struct MatchContext {
    account_hints: Vec<String>,
    keywords: Vec<String>,
    min_settlement_amount: f64,
}

impl MatchContext {
    fn new(query: &SettlementQuery, config: &SettlementConfig) -> Self {
        let mut account_hints = Vec::new();
        if let Some(account) = query
            .credit_card_account_number
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
        {
            account_hints.push(account.to_string());
            account_hints.extend(account_last4(account));
        }
        account_hints.extend(query.card_last4.as_deref().and_then(account_last4));

        let mut keywords: Vec<String> = Vec::new();
        if let Some(nickname) = query.card_nickname.as_deref() {
            keywords.extend(nickname_tokens(nickname));
        }
        keywords.extend(
            vendor_keywords(&query.credit_card_vendor)
                .iter()
                .map(|k| k.to_string()),
        );
        keywords.extend(config.generic_phrases.iter().cloned());

        Self {
            account_hints: normalize_patterns(&account_hints),
            keywords: normalize_patterns(&keywords),
            min_settlement_amount: config.min_settlement_amount,
        }
    }

    fn evaluate(&self, tx: &Transaction) -> Option<SettlementCandidate> {
        let digits = extract_digit_sequences(&tx.description);
        let account_hits: Vec<&String> = self
            .account_hints
            .iter()
            .filter(|hint| digits.contains(hint))
            .collect();
        let category_hit = tx.amount < 0.0
            && tx.amount.abs() >= self.min_settlement_amount
            && tx.category.as_deref().is_some_and(is_repayment_category);
        let keyword_hits: Vec<&String> = self
            .keywords
            .iter()
            .filter(|kw| contains_ci(&tx.description, kw))
            .collect();

        let reason = if !account_hits.is_empty() {
            MatchReason::AccountNumberMatch
        } else if category_hit {
            MatchReason::CategoryMatch
        } else if !keyword_hits.is_empty() {
            MatchReason::KeywordMatch
        } else {
            return None;
        };

        let matched_patterns: Vec<String> = normalize_patterns(
            &account_hits
                .into_iter()
                .chain(keyword_hits)
                .cloned()
                .collect::<Vec<_>>(),
        );

        // The category itself counts as the first signal of a category match
        let extra = match reason {
            MatchReason::CategoryMatch => matched_patterns.len(),
            _ => matched_patterns.len().saturating_sub(1),
        };
        let confidence =
            (reason.base_confidence() + PATTERN_BONUS * extra as f64).min(MAX_CONFIDENCE);

        Some(SettlementCandidate {
            transaction: tx.clone(),
            reason,
            confidence,
            matched_patterns,
        })
    }
}

/// Nickname words of 3+ chars
fn nickname_tokens(nickname: &str) -> Vec<String> {
    nickname
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '-' | '/' | '(' | ')'))
        .map(str::trim)
        .filter(|t| t.chars().count() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

fn rank(candidates: &mut [SettlementCandidate]) {
    candidates.sort_by(|a, b| {
        b.reason
            .strength()
            .cmp(&a.reason.strength())
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.transaction.date.cmp(&a.transaction.date))
            .then_with(|| b.transaction.id.cmp(&a.transaction.id))
    });
}

/// Finds settlement candidates in bank accounts
pub struct SettlementFinder<'a> {
    db: &'a Database,
    config: &'a SettlementConfig,
}

impl<'a> SettlementFinder<'a> {
    pub fn new(db: &'a Database, config: &'a SettlementConfig) -> Self {
        Self { db, config }
    }

    fn scan(&self, query: &SettlementQuery) -> Result<Vec<SettlementCandidate>> {
        query.validate()?;
        let context = MatchContext::new(query, self.config);

        let bank_account = query
            .bank_account_number
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());
        let scanned = self.db.transactions_for_vendor(
            query.bank_vendor.trim(),
            bank_account,
            self.config.scan_limit,
        )?;

        let mut candidates: Vec<SettlementCandidate> =
            scanned.iter().filter_map(|tx| context.evaluate(tx)).collect();
        rank(&mut candidates);

        debug!(
            "Scanned {} transactions of {}, found {} candidates",
            scanned.len(),
            query.bank_vendor,
            candidates.len()
        );
        Ok(candidates)
    }

    /// Candidates from account number, category and vendor/generic keywords
    pub fn find_settlement_candidates(&self, query: &SettlementQuery) -> Result<CandidateSearch> {
        let plain = SettlementQuery {
            card_nickname: None,
            card_last4: None,
            ..query.clone()
        };
        let candidates = self.scan(&plain)?;
        Ok(CandidateSearch {
            summary: CandidateSummary::from_candidates(&candidates),
            candidates,
        })
    }

    /// Candidates using every hint, plus the patterns a pairing should use
    pub fn smart_match(&self, query: &SettlementQuery) -> Result<SmartMatchResult> {
        let candidates = self.scan(query)?;

        let mut patterns = build_match_patterns(
            query.credit_card_vendor.trim(),
            query.credit_card_account_number.as_deref(),
        );
        for candidate in &candidates {
            patterns.extend(candidate.matched_patterns.iter().cloned());
        }

        Ok(SmartMatchResult {
            summary: CandidateSummary::from_candidates(&candidates),
            candidates,
            suggested_patterns: normalize_patterns(&patterns),
        })
    }

    /// Guess which bank account pays a card's bills
    pub fn suggest_bank_account(
        &self,
        cc_vendor: &str,
        cc_account: Option<&str>,
        bank_vendor: Option<&str>,
        bank_account: Option<&str>,
    ) -> Result<Option<BankAccountSuggestion>> {
        if cc_vendor.trim().is_empty() {
            return Err(Error::Validation("Credit card vendor is required".into()));
        }
        let cc_vendor = cc_vendor.trim();
        let cc_last4 = cc_account.and_then(account_last4);

        let debits = self
            .db
            .debits_in_categories(REPAYMENT_CATEGORY_NAMES, self.config.scan_limit)?;

        let mut groups: BTreeMap<(String, Option<String>), Vec<Transaction>> = BTreeMap::new();
        for tx in debits {
            if is_card_vendor(&tx.vendor)
                || bank_vendor.is_some_and(|v| v != tx.vendor)
                || bank_account.is_some_and(|a| tx.account_number.as_deref() != Some(a))
            {
                continue;
            }
            groups
                .entry((tx.vendor.clone(), tx.account_number.clone()))
                .or_default()
                .push(tx);
        }

        let is_last4_hit =
            |tx: &Transaction| cc_last4.as_deref().is_some_and(|l| tx.description.contains(l));
        let is_vendor_hit = |tx: &Transaction| name_contains_vendor(&tx.description, cc_vendor);

        let mut ranked: Vec<(BankAccountCandidate, Vec<Transaction>)> = groups
            .into_iter()
            .map(|((vendor, account), txs)| {
                let candidate = BankAccountCandidate {
                    bank_vendor: vendor,
                    bank_account_number: account,
                    last4_hits: txs.iter().filter(|&t| is_last4_hit(t)).count(),
                    vendor_hits: txs.iter().filter(|&t| is_vendor_hit(t)).count(),
                    transaction_count: txs.len(),
                };
                let samples: Vec<Transaction> = txs
                    .into_iter()
                    .filter(|t| is_last4_hit(t) || is_vendor_hit(t))
                    .take(MAX_SAMPLES)
                    .collect();
                (candidate, samples)
            })
            .filter(|(c, _)| c.last4_hits > 0 || c.vendor_hits > 0)
            .collect();

        ranked.sort_by(|(a, _), (b, _)| {
            (b.last4_hits, b.vendor_hits, b.transaction_count).cmp(&(
                a.last4_hits,
                a.vendor_hits,
                a.transaction_count,
            ))
        });

        let mut ranked = ranked.into_iter();
        let Some((best, samples)) = ranked.next() else {
            return Ok(None);
        };

        Ok(Some(BankAccountSuggestion {
            best,
            match_patterns: build_match_patterns(cc_vendor, cc_account),
            samples,
            other_candidates: ranked.take(MAX_OTHER_ACCOUNTS).map(|(c, _)| c).collect(),
        }))
    }
}
