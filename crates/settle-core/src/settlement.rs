//! Settlement pairing matcher
//!
//! A settlement is the bank-side payment of a credit card bill. The card-side
//! purchases are already in the ledger, so settlements are excluded from
//! spending aggregates. Matching is driven by [`AccountPairing`]s.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DiscrepancyConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{AccountPairing, Transaction};

/// Card vendors and the keywords their settlements carry in bank descriptions
pub const VENDOR_KEYWORDS: &[(&str, &[&str])] = &[
    ("max", &["מקס", "max"]),
    ("visaCal", &["כ.א.ל", "cal", "ויזה כאל", "visa cal"]),
    ("isracard", &["ישראכרט", "isracard"]),
    ("amex", &["אמקס", "אמריקן אקספרס", "amex", "american express"]),
    ("leumi", &["לאומי כרט", "leumi card"]),
    ("diners", &["דיינרס", "diners"]),
];

/// Category names that mark a bank debit as a card repayment
pub const REPAYMENT_CATEGORY_NAMES: &[&str] = &[
    "פרעון כרטיס אשראי",
    "החזר כרטיס אשראי",
    "Credit Card Repayment",
    "Card repayment",
    "Credit card repayment",
];

/// Keywords for a card vendor (empty for unknown vendors)
pub fn vendor_keywords(vendor: &str) -> &'static [&'static str] {
    VENDOR_KEYWORDS
        .iter()
        .find(|(v, _)| v.eq_ignore_ascii_case(vendor))
        .map(|(_, keywords)| *keywords)
        .unwrap_or(&[])
}

pub fn is_card_vendor(vendor: &str) -> bool {
    VENDOR_KEYWORDS
        .iter()
        .any(|(v, _)| v.eq_ignore_ascii_case(vendor))
}

pub fn is_repayment_category(label: &str) -> bool {
    REPAYMENT_CATEGORY_NAMES.contains(&label.trim())
}

/// Case-insensitive substring test
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn name_contains_vendor(name: &str, vendor: &str) -> bool {
    vendor_keywords(vendor).iter().any(|kw| contains_ci(name, kw))
}

/// The trimmed account number, or its last 4 chars when longer
pub fn account_last4(account: &str) -> Option<String> {
    let trimmed = account.trim();
    if trimmed.is_empty() {
        return None;
    }
    let chars: Vec<char> = trimmed.chars().collect();
    let start = chars.len().saturating_sub(4);
    Some(chars[start..].iter().collect())
}

/// Runs of 4+ digits, plus the last 4 of each longer run; sorted and unique
pub fn extract_digit_sequences(text: &str) -> Vec<String> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"[0-9]{4,}").expect("valid regex"));

    let mut out: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let run = m.as_str();
        out.push(run.to_string());
        if run.len() > 4 {
            out.push(run[run.len() - 4..].to_string());
        }
    }
    out.sort();
    out.dedup();
    out
}

/// Default match patterns for a card: vendor keywords, the account number, then its last 4
pub fn build_match_patterns(cc_vendor: &str, cc_account: Option<&str>) -> Vec<String> {
    let mut patterns: Vec<String> = vendor_keywords(cc_vendor)
        .iter()
        .map(|kw| kw.to_string())
        .collect();

    if let Some(account) = cc_account.map(str::trim).filter(|a| !a.is_empty()) {
        patterns.push(account.to_string());
        if let Some(last4) = account_last4(account) {
            patterns.push(last4);
        }
    }

    crate::models::normalize_patterns(&patterns)
}

/// How strongly a bank description points at this pairing's card
///
/// 2 when a digit run equals the card number or its last 4, 1 for a vendor
/// keyword, 0 otherwise.
pub fn repayment_match_strength(pairing: &AccountPairing, name: &str) -> u8 {
    let hints = extract_digit_sequences(name);
    let account = pairing
        .credit_card_account_number
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());

    if let Some(account) = account {
        let last4 = account_last4(account);
        if hints
            .iter()
            .any(|h| h == account || Some(h) == last4.as_ref())
        {
            return 2;
        }
    }
    if name_contains_vendor(name, &pairing.credit_card_vendor) {
        return 1;
    }
    0
}

fn matches_pairing(tx: &Transaction, pairing: &AccountPairing) -> bool {
    if !pairing.is_active || tx.vendor != pairing.bank_vendor {
        return false;
    }
    if let Some(account) = pairing.bank_account_number.as_deref() {
        if tx.account_number.as_deref() != Some(account) {
            return false;
        }
    }
    let description = tx.description.to_lowercase();
    pairing
        .match_patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .any(|p| !p.is_empty() && description.contains(&p))
}

/// True when some active pairing claims the transaction as a card settlement
pub fn is_settlement(tx: &Transaction, pairings: &[AccountPairing]) -> bool {
    pairings.iter().any(|p| matches_pairing(tx, p))
}

/// The pairing a settlement belongs to, preferring the strongest description match
pub fn pairing_for_transaction<'p>(
    tx: &Transaction,
    pairings: &'p [AccountPairing],
) -> Option<&'p AccountPairing> {
    pairings
        .iter()
        .filter(|p| matches_pairing(tx, p))
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            repayment_match_strength(a, &tx.description)
                .cmp(&repayment_match_strength(b, &tx.description))
                // earlier pairing wins ties
                .then_with(|| ib.cmp(ia))
        })
        .map(|(_, p)| p)
}

// ========== Discrepancy Analysis ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Matched,
    FeeCandidate,
    LargeDiscrepancy,
    CcOverBank,
    MissingCcCycle,
    IncompleteHistory,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::FeeCandidate => "fee_candidate",
            Self::LargeDiscrepancy => "large_discrepancy",
            Self::CcOverBank => "cc_over_bank",
            Self::MissingCcCycle => "missing_cc_cycle",
            Self::IncompleteHistory => "incomplete_history",
        }
    }

    /// Statuses that warrant a look from the user
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            Self::FeeCandidate | Self::LargeDiscrepancy | Self::CcOverBank | Self::MissingCcCycle
        )
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One billing cycle: bank settlements on a date vs. card charges billed that date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleComparison {
    pub cycle_date: NaiveDate,
    pub bank_total: f64,
    pub card_total: Option<f64>,
    /// bank - card
    pub difference: Option<f64>,
    pub status: CycleStatus,
    pub matched_account: Option<String>,
    pub settlement_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub pairing_id: i64,
    /// Some cycle is actionable and the pairing is not acknowledged
    pub exists: bool,
    pub acknowledged: bool,
    pub as_of: NaiveDate,
    pub months_back: u32,
    /// Totals over comparable cycles (card data present, history complete)
    pub total_bank: f64,
    pub total_card: f64,
    pub difference: f64,
    pub difference_pct: f64,
    pub matched_cycles: usize,
    pub total_cycles: usize,
    /// Newest first
    pub cycles: Vec<CycleComparison>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn classify(bank_total: f64, card_total: f64, config: &DiscrepancyConfig) -> CycleStatus {
    let diff = bank_total - card_total;
    if diff.abs() <= config.epsilon {
        CycleStatus::Matched
    } else if diff > 0.0 && diff <= config.max_fee_amount {
        CycleStatus::FeeCandidate
    } else if diff > config.max_fee_amount {
        CycleStatus::LargeDiscrepancy
    } else {
        CycleStatus::CcOverBank
    }
}

/// Pick the card account whose total explains `bank_total`
///
/// An account within epsilon wins outright. Next comes an account the bank
/// total exceeds by no more than the fee window, then the pairing's own card
/// account. Anything else leaves the cycle without a card total.
fn pick_card_total(
    bank_total: f64,
    per_account: &BTreeMap<Option<String>, f64>,
    cc_account: Option<&str>,
    config: &DiscrepancyConfig,
) -> Option<(Option<String>, f64)> {
    let diff = |total: f64| (bank_total - total).abs();

    if let Some((account, total)) = per_account.iter().find(|(_, t)| diff(**t) <= config.epsilon) {
        return Some((account.clone(), *total));
    }
    if let Some((account, total)) = per_account
        .iter()
        .filter(|(_, t)| bank_total > **t && diff(**t) <= config.max_fee_amount)
        .last()
    {
        return Some((account.clone(), *total));
    }
    let account = cc_account?;
    per_account
        .iter()
        .find(|(a, _)| a.as_deref() == Some(account))
        .map(|(a, t)| (a.clone(), *t))
}

/// Compare a pairing's bank settlements with the card charges they pay off
pub fn analyze_discrepancy(
    db: &Database,
    config: &DiscrepancyConfig,
    pairing: &AccountPairing,
    as_of: NaiveDate,
    months_back: u32,
) -> Result<DiscrepancyReport> {
    let start = as_of
        .checked_sub_months(Months::new(months_back))
        .unwrap_or(NaiveDate::MIN);
    let single = std::slice::from_ref(pairing);

    // Bank side: settlements of this pairing, grouped by date
    let mut bank_cycles: BTreeMap<NaiveDate, (f64, Vec<i64>)> = BTreeMap::new();
    for tx in db.transactions_between(start, as_of)? {
        if tx.amount >= 0.0 || !is_settlement(&tx, single) {
            continue;
        }
        let cycle = bank_cycles.entry(tx.date).or_insert((0.0, Vec::new()));
        cycle.0 += tx.amount.abs();
        cycle.1.push(tx.id);
    }

    // Card side: charges keyed by billing date, per card account
    let cc_account = pairing.credit_card_account_number.as_deref();
    let mut card_cycles: BTreeMap<NaiveDate, BTreeMap<Option<String>, f64>> = BTreeMap::new();
    for tx in db.card_transactions(&pairing.credit_card_vendor, cc_account)? {
        let billed = tx.processed_date.unwrap_or(tx.date);
        *card_cycles
            .entry(billed)
            .or_default()
            .entry(tx.account_number.clone())
            .or_insert(0.0) -= tx.amount;
    }
    let earliest_card_cycle = card_cycles.keys().next().copied();

    let mut cycles: Vec<CycleComparison> = bank_cycles
        .into_iter()
        .map(|(cycle_date, (bank_total, settlement_ids))| {
            let picked = card_cycles.get(&cycle_date).and_then(|per_account| {
                let clamped: BTreeMap<Option<String>, f64> = per_account
                    .iter()
                    .map(|(a, t)| (a.clone(), t.max(0.0)))
                    .collect();
                pick_card_total(bank_total, &clamped, cc_account, config)
            });

            let (status, card_total, matched_account) = match picked {
                Some((account, total)) => (classify(bank_total, total, config), Some(total), account),
                None => (CycleStatus::MissingCcCycle, None, None),
            };

            let status = if status.is_actionable() {
                let too_early = earliest_card_cycle
                    .is_some_and(|e| (cycle_date - e).num_days() <= config.early_grace_days);
                let recent_days = (as_of - cycle_date).num_days();
                let too_recent = (0..=config.recent_grace_days).contains(&recent_days);
                if too_early || too_recent {
                    CycleStatus::IncompleteHistory
                } else {
                    status
                }
            } else {
                status
            };

            CycleComparison {
                cycle_date,
                bank_total: round2(bank_total),
                card_total: card_total.map(round2),
                difference: card_total.map(|c| round2(bank_total - c)),
                status,
                matched_account,
                settlement_ids,
            }
        })
        .collect();
    cycles.sort_by(|a, b| b.cycle_date.cmp(&a.cycle_date));

    let comparable: Vec<&CycleComparison> = cycles
        .iter()
        .filter(|c| c.card_total.is_some() && c.status != CycleStatus::IncompleteHistory)
        .collect();
    let total_bank: f64 = comparable.iter().map(|c| c.bank_total).sum();
    let total_card: f64 = comparable.iter().filter_map(|c| c.card_total).sum();
    let difference = total_bank - total_card;
    let difference_pct = if total_card > 0.0 {
        round2(difference / total_card * 100.0)
    } else {
        0.0
    };

    let actionable = cycles.iter().any(|c| c.status.is_actionable());
    debug!(
        "Pairing {}: {} cycles, actionable={}",
        pairing.id,
        cycles.len(),
        actionable
    );

    Ok(DiscrepancyReport {
        pairing_id: pairing.id,
        exists: actionable && !pairing.discrepancy_acknowledged,
        acknowledged: pairing.discrepancy_acknowledged,
        as_of,
        months_back,
        total_bank: round2(total_bank),
        total_card: round2(total_card),
        difference: round2(difference),
        difference_pct,
        matched_cycles: cycles
            .iter()
            .filter(|c| c.status == CycleStatus::Matched)
            .count(),
        total_cycles: cycles.len(),
        cycles,
    })
}
