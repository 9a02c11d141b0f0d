//! Spending aggregates
//!
//! Every aggregate excludes settlement transactions: a bank-side payment of a
//! card bill repeats cash flow already counted on the card side.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate};

use super::Database;
use crate::error::{Error, Result};
use crate::models::*;
use crate::settlement::is_settlement;

const UNCATEGORIZED: &str = "Uncategorized";

/// Parse "YYYY-MM" into the first and last day of that month
fn month_bounds(period: &str) -> Result<(NaiveDate, NaiveDate)> {
    let invalid = || Error::Validation(format!("Invalid period '{}', expected YYYY-MM", period));

    if period.len() != 7 {
        return Err(invalid());
    }
    let start = NaiveDate::parse_from_str(&format!("{}-01", period), "%Y-%m-%d")
        .map_err(|_| invalid())?;
    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    let end = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.pred_opt())
        .ok_or_else(invalid)?;
    Ok((start, end))
}

fn check_range(from: NaiveDate, to: NaiveDate) -> Result<()> {
    if from > to {
        return Err(Error::Validation(format!(
            "Start date {} is after end date {}",
            from, to
        )));
    }
    Ok(())
}

impl Database {
    /// Expenses booked in a calendar month, settlements excluded
    pub fn monthly_expenses(&self, period: &str) -> Result<MonthlyExpenseReport> {
        let (start, end) = month_bounds(period)?;
        let pairings = self.list_active_pairings()?;

        let mut report = MonthlyExpenseReport {
            period: period.to_string(),
            total: 0.0,
            transaction_count: 0,
            excluded_settlements: 0,
            excluded_amount: 0.0,
        };

        for tx in self.transactions_between(start, end)? {
            if tx.amount >= 0.0 {
                continue;
            }
            if is_settlement(&tx, &pairings) {
                report.excluded_settlements += 1;
                report.excluded_amount += tx.amount;
            } else {
                report.total += tx.amount;
                report.transaction_count += 1;
            }
        }

        Ok(report)
    }

    /// Expense totals per category over [from, to], largest first
    pub fn spending_by_category(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CategorySpending>> {
        check_range(from, to)?;
        let pairings = self.list_active_pairings()?;

        let mut totals: HashMap<(Option<i64>, String), (f64, i64)> = HashMap::new();
        for tx in self.transactions_between(from, to)? {
            if tx.amount >= 0.0 || is_settlement(&tx, &pairings) {
                continue;
            }
            let label = tx.category.clone().unwrap_or_else(|| UNCATEGORIZED.to_string());
            let entry = totals
                .entry((tx.category_definition_id, label))
                .or_insert((0.0, 0));
            entry.0 += -tx.amount;
            entry.1 += 1;
        }

        let mut spending: Vec<CategorySpending> = totals
            .into_iter()
            .map(|((category_definition_id, category), (amount, count))| CategorySpending {
                category_definition_id,
                category,
                amount,
                transaction_count: count,
            })
            .collect();
        spending.sort_by(|a, b| {
            b.amount
                .partial_cmp(&a.amount)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.category.cmp(&b.category))
        });

        Ok(spending)
    }

    /// Expense total for one category, optionally including its subcategories
    pub fn category_spending(
        &self,
        category_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        include_subcategories: bool,
    ) -> Result<CategorySpending> {
        check_range(from, to)?;
        let category = self
            .get_category(category_id)?
            .ok_or_else(|| Error::NotFound(format!("Category {}", category_id)))?;

        let ids: HashSet<i64> = if include_subcategories {
            self.category_descendants(category_id)?.into_iter().collect()
        } else {
            HashSet::from([category_id])
        };
        let pairings = self.list_active_pairings()?;

        let mut spending = CategorySpending {
            category_definition_id: Some(category.id),
            category: category.name,
            amount: 0.0,
            transaction_count: 0,
        };
        for tx in self.transactions_between(from, to)? {
            let in_scope = tx
                .category_definition_id
                .is_some_and(|id| ids.contains(&id));
            if !in_scope || tx.amount >= 0.0 || is_settlement(&tx, &pairings) {
                continue;
            }
            spending.amount += -tx.amount;
            spending.transaction_count += 1;
        }

        Ok(spending)
    }
}
