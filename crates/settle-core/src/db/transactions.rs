//! Ledger operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{parse_date, parse_datetime, Database, DbConn};
use crate::error::{Error, Result};
use crate::models::*;

/// Result of inserting a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionInsertResult {
    /// Transaction was inserted successfully, contains new transaction ID
    Inserted(i64),
    /// A row with the same (external_id, vendor) already existed, contains its ID
    Duplicate(i64),
}

impl TransactionInsertResult {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => *id,
        }
    }
}

/// Classification columns of a row a rule is allowed to claim
#[derive(Debug, Clone)]
pub(crate) struct ClaimableRow {
    pub id: i64,
    pub description: String,
    pub confidence_score: f64,
    pub matched_rule_id: Option<i64>,
    pub category_definition_id: Option<i64>,
    pub category: Option<String>,
}

const TRANSACTION_COLUMNS: &str = "id, external_id, vendor, date, processed_date, description, \
     amount, raw_category, category_definition_id, category, category_type, merchant_name, \
     auto_categorized, confidence_score, category_source, matched_rule_id, manual_override, \
     account_number, status, created_at";

pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let date_str: String = row.get(3)?;
    let processed_str: Option<String> = row.get(4)?;
    let type_str: Option<String> = row.get(10)?;
    let source_str: Option<String> = row.get(14)?;
    let status_str: String = row.get(18)?;
    let created_at_str: String = row.get(19)?;
    Ok(Transaction {
        id: row.get(0)?,
        external_id: row.get(1)?,
        vendor: row.get(2)?,
        date: parse_date(&date_str),
        processed_date: processed_str.as_deref().map(parse_date),
        description: row.get(5)?,
        amount: row.get(6)?,
        raw_category: row.get(7)?,
        category_definition_id: row.get(8)?,
        category: row.get(9)?,
        category_type: type_str.and_then(|s| s.parse().ok()),
        merchant_name: row.get(11)?,
        auto_categorized: row.get::<_, i64>(12)? != 0,
        confidence_score: row.get(13)?,
        category_source: source_str.and_then(|s| s.parse().ok()),
        matched_rule_id: row.get(15)?,
        manual_override: row.get::<_, i64>(16)? != 0,
        account_number: row.get(17)?,
        status: status_str.parse().unwrap_or_default(),
        created_at: parse_datetime(&created_at_str),
    })
}

/// Rows eligible for a rule claim: not manually overridden, not income, and
/// not already classified above `max_confidence`
pub(crate) fn load_claimable(conn: &DbConn, max_confidence: f64) -> Result<Vec<ClaimableRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, description, confidence_score, matched_rule_id, category_definition_id, category
        FROM transactions
        WHERE manual_override = 0
          AND COALESCE(category_type, '') != 'income'
          AND confidence_score <= ?
        "#,
    )?;

    let rows = stmt
        .query_map(params![max_confidence], |row| {
            Ok(ClaimableRow {
                id: row.get(0)?,
                description: row.get(1)?,
                confidence_score: row.get(2)?,
                matched_rule_id: row.get(3)?,
                category_definition_id: row.get(4)?,
                category: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Write a classification to one row; manual overrides are left untouched
pub(crate) fn write_category_match(conn: &DbConn, id: i64, m: &CategoryMatch) -> Result<usize> {
    let changed = conn.execute(
        r#"
        UPDATE transactions
        SET category_definition_id = ?,
            category = ?,
            category_type = ?,
            auto_categorized = 1,
            confidence_score = ?,
            category_source = ?,
            matched_rule_id = ?
        WHERE id = ? AND manual_override = 0
        "#,
        params![
            m.category_definition_id,
            m.category,
            m.category_type.as_str(),
            m.confidence,
            m.source.as_str(),
            m.rule_id,
            id,
        ],
    )?;
    Ok(changed)
}

impl Database {
    /// Insert a raw row with its initial classification
    ///
    /// Conflict-idempotent on (external_id, vendor): re-ingesting the same row
    /// returns `Duplicate` with the existing ID and changes nothing.
    pub fn insert_transaction(
        &self,
        raw: &RawTransaction,
        merchant_name: Option<&str>,
        categorization: Option<&CategoryMatch>,
    ) -> Result<TransactionInsertResult> {
        let conn = self.conn()?;

        let changed = conn.execute(
            r#"
            INSERT INTO transactions (
                external_id, vendor, date, processed_date, description, amount, raw_category,
                account_number, status, merchant_name,
                category_definition_id, category, category_type, auto_categorized,
                confidence_score, category_source, matched_rule_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id, vendor) DO NOTHING
            "#,
            params![
                raw.external_id,
                raw.vendor,
                raw.date.to_string(),
                raw.processed_date.map(|d| d.to_string()),
                raw.description,
                raw.amount,
                raw.raw_category,
                raw.account_number,
                raw.status.unwrap_or_default().as_str(),
                merchant_name,
                categorization.and_then(|m| m.category_definition_id),
                categorization.map(|m| m.category.as_str()),
                categorization.map(|m| m.category_type.as_str()),
                categorization.is_some(),
                categorization.map(|m| m.confidence).unwrap_or(0.0),
                categorization.map(|m| m.source.as_str()),
                categorization.and_then(|m| m.rule_id),
            ],
        )?;

        if changed > 0 {
            return Ok(TransactionInsertResult::Inserted(conn.last_insert_rowid()));
        }

        let existing: i64 = conn.query_row(
            "SELECT id FROM transactions WHERE external_id = ? AND vendor = ?",
            params![raw.external_id, raw.vendor],
            |row| row.get(0),
        )?;
        Ok(TransactionInsertResult::Duplicate(existing))
    }

    /// Get a single transaction by ID
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_transaction).optional()?)
    }

    /// Look up a transaction by its upstream identity
    pub fn find_transaction(&self, external_id: &str, vendor: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM transactions WHERE external_id = ? AND vendor = ?",
            TRANSACTION_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![external_id, vendor], row_to_transaction)
            .optional()?)
    }

    /// List transactions, newest first
    pub fn list_transactions(&self, limit: i64, offset: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM transactions ORDER BY date DESC, id DESC LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params![limit, offset], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Count total transactions
    pub fn count_transactions(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Most recent transactions of a vendor, optionally narrowed to one account
    pub fn transactions_for_vendor(
        &self,
        vendor: &str,
        account_number: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM transactions
            WHERE vendor = ?1 AND (?2 IS NULL OR account_number = ?2)
            ORDER BY date DESC, id DESC
            LIMIT ?3
            "#,
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params![vendor, account_number, limit], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Completed transactions dated within [from, to]
    pub fn transactions_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM transactions
            WHERE substr(date, 1, 10) >= ? AND substr(date, 1, 10) <= ? AND status = 'completed'
            ORDER BY date, id
            "#,
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params![from.to_string(), to.to_string()], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Card-side transactions of one vendor, optionally narrowed to an account
    pub fn card_transactions(
        &self,
        vendor: &str,
        account_number: Option<&str>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM transactions
            WHERE vendor = ?1 AND (?2 IS NULL OR account_number = ?2) AND status = 'completed'
            ORDER BY COALESCE(processed_date, date), id
            "#,
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params![vendor, account_number], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Debit transactions whose category label or definition name is one of `names`
    pub fn debits_in_categories(&self, names: &[&str], limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let placeholders = vec!["?"; names.len()].join(", ");
        let columns = TRANSACTION_COLUMNS
            .split(", ")
            .map(|c| format!("t.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT {columns} FROM transactions t
            LEFT JOIN category_definitions cd ON cd.id = t.category_definition_id
            WHERE t.amount < 0
              AND (t.category IN ({p}) OR cd.name IN ({p}) OR cd.name_en IN ({p}))
            ORDER BY t.date DESC, t.id DESC
            LIMIT {limit}
            "#,
            columns = columns,
            p = placeholders,
            limit = limit.max(0),
        );

        let mut bound: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(names.len() * 3);
        for _ in 0..3 {
            for name in names {
                bound.push(name);
            }
        }

        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(bound.as_slice(), row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Commit an automatic classification to a row
    ///
    /// Returns false when the row is manually overridden.
    pub fn apply_category_match(&self, id: i64, m: &CategoryMatch) -> Result<bool> {
        let conn = self.conn()?;
        if self.get_transaction(id)?.is_none() {
            return Err(Error::NotFound(format!("Transaction {}", id)));
        }
        Ok(write_category_match(&conn, id, m)? > 0)
    }

    /// Manually set a transaction's category; automatic passes will not touch it again
    pub fn set_manual_category(&self, id: i64, category: &ResolvedCategory) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE transactions
            SET category_definition_id = ?,
                category = ?,
                category_type = ?,
                auto_categorized = 0,
                confidence_score = 1.0,
                category_source = 'manual',
                matched_rule_id = NULL,
                manual_override = 1
            WHERE id = ?
            "#,
            params![
                category.id,
                category.name,
                category.category_type.as_str(),
                id
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Transaction {}", id)));
        }
        Ok(())
    }
}
