//! Account pairing operations
//!
//! Pairings are never deleted; deactivation keeps the audit trail intact.

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{parse_datetime, Database, DbConn};
use crate::error::{Error, Result};
use crate::models::*;

const PAIRING_COLUMNS: &str = "id, credit_card_vendor, credit_card_account_number, bank_vendor, \
     bank_account_number, match_patterns, is_active, discrepancy_acknowledged, created_at, updated_at";

fn row_to_pairing(row: &rusqlite::Row) -> rusqlite::Result<AccountPairing> {
    let patterns_json: String = row.get(5)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;
    Ok(AccountPairing {
        id: row.get(0)?,
        credit_card_vendor: row.get(1)?,
        credit_card_account_number: row.get(2)?,
        bank_vendor: row.get(3)?,
        bank_account_number: row.get(4)?,
        match_patterns: serde_json::from_str(&patterns_json).unwrap_or_default(),
        is_active: row.get::<_, i64>(6)? != 0,
        discrepancy_acknowledged: row.get::<_, i64>(7)? != 0,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

fn fetch_pairing(conn: &DbConn, id: i64) -> Result<Option<AccountPairing>> {
    let sql = format!("SELECT {} FROM account_pairings WHERE id = ?", PAIRING_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_pairing).optional()?)
}

/// Another active pairing with the same four identifiers, if any
fn find_active_duplicate(
    conn: &DbConn,
    exclude_id: Option<i64>,
    credit_card_vendor: &str,
    credit_card_account_number: Option<&str>,
    bank_vendor: &str,
    bank_account_number: Option<&str>,
) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            r#"
            SELECT id FROM account_pairings
            WHERE is_active = 1
              AND credit_card_vendor = ?1
              AND credit_card_account_number IS ?2
              AND bank_vendor = ?3
              AND bank_account_number IS ?4
              AND (?5 IS NULL OR id != ?5)
            LIMIT 1
            "#,
            params![
                credit_card_vendor,
                credit_card_account_number,
                bank_vendor,
                bank_account_number,
                exclude_id,
            ],
            |row| row.get(0),
        )
        .optional()?)
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Database {
    /// Create a pairing
    pub fn create_pairing(&self, new: &NewAccountPairing) -> Result<AccountPairing> {
        let patterns = new.validate()?;
        let conn = self.conn()?;

        let cc_vendor = new.credit_card_vendor.trim();
        let cc_account = trimmed(new.credit_card_account_number.as_deref());
        let bank_vendor = new.bank_vendor.trim();
        let bank_account = trimmed(new.bank_account_number.as_deref());

        if let Some(existing) = find_active_duplicate(
            &conn,
            None,
            cc_vendor,
            cc_account.as_deref(),
            bank_vendor,
            bank_account.as_deref(),
        )? {
            return Err(Error::Conflict(format!(
                "An active pairing with the same accounts already exists (id {})",
                existing
            )));
        }

        conn.execute(
            r#"
            INSERT INTO account_pairings (
                credit_card_vendor, credit_card_account_number, bank_vendor, bank_account_number, match_patterns
            )
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                cc_vendor,
                cc_account,
                bank_vendor,
                bank_account,
                serde_json::to_string(&patterns)?,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created pairing {} ({} -> {})", id, cc_vendor, bank_vendor);

        fetch_pairing(&conn, id)?.ok_or_else(|| Error::NotFound(format!("Pairing {}", id)))
    }

    /// Get a pairing by ID
    pub fn get_pairing(&self, id: i64) -> Result<Option<AccountPairing>> {
        let conn = self.conn()?;
        fetch_pairing(&conn, id)
    }

    /// List pairings, newest first
    pub fn list_pairings(&self, include_inactive: bool) -> Result<Vec<AccountPairing>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM account_pairings
            WHERE is_active = 1 OR ?1
            ORDER BY created_at DESC, id DESC
            "#,
            PAIRING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let pairings = stmt
            .query_map(params![include_inactive], row_to_pairing)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairings)
    }

    /// Active pairings only
    pub fn list_active_pairings(&self) -> Result<Vec<AccountPairing>> {
        self.list_pairings(false)
    }

    /// Merge a patch into a pairing and write the full row back
    pub fn update_pairing(&self, id: i64, patch: &PairingPatch) -> Result<AccountPairing> {
        let conn = self.conn()?;

        let mut pairing =
            fetch_pairing(&conn, id)?.ok_or_else(|| Error::NotFound(format!("Pairing {}", id)))?;
        patch.apply_to(&mut pairing)?;

        if pairing.is_active {
            if let Some(existing) = find_active_duplicate(
                &conn,
                Some(id),
                &pairing.credit_card_vendor,
                pairing.credit_card_account_number.as_deref(),
                &pairing.bank_vendor,
                pairing.bank_account_number.as_deref(),
            )? {
                return Err(Error::Conflict(format!(
                    "An active pairing with the same accounts already exists (id {})",
                    existing
                )));
            }
        }

        conn.execute(
            r#"
            UPDATE account_pairings
            SET credit_card_account_number = ?, bank_account_number = ?, match_patterns = ?,
                is_active = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![
                pairing.credit_card_account_number,
                pairing.bank_account_number,
                serde_json::to_string(&pairing.match_patterns)?,
                pairing.is_active,
                id,
            ],
        )?;

        fetch_pairing(&conn, id)?.ok_or_else(|| Error::NotFound(format!("Pairing {}", id)))
    }

    /// Soft delete
    pub fn deactivate_pairing(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE account_pairings SET is_active = 0, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Pairing {}", id)));
        }
        Ok(())
    }

    /// Mark the pairing's discrepancy as reviewed
    pub fn acknowledge_discrepancy(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE account_pairings
            SET discrepancy_acknowledged = 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Pairing {}", id)));
        }
        Ok(())
    }
}
