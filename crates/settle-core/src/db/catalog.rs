//! Merchant catalog operations

use rusqlite::params;

use super::Database;
use crate::error::{Error, Result};
use crate::models::*;

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<MerchantCatalogEntry> {
    Ok(MerchantCatalogEntry {
        id: row.get(0)?,
        merchant_pattern: row.get(1)?,
        parent_category: row.get(2)?,
        subcategory: row.get(3)?,
        confidence: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
    })
}

impl Database {
    /// Add a catalog entry
    pub fn create_catalog_entry(&self, new: &NewCatalogEntry) -> Result<i64> {
        new.validate()?;
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO merchant_catalog (merchant_pattern, parent_category, subcategory, confidence)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                new.merchant_pattern.trim(),
                new.parent_category.trim(),
                new.subcategory
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty()),
                new.confidence,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// List catalog entries
    pub fn list_catalog_entries(&self, include_inactive: bool) -> Result<Vec<MerchantCatalogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, merchant_pattern, parent_category, subcategory, confidence, is_active
            FROM merchant_catalog
            WHERE is_active = 1 OR ?1
            ORDER BY id
            "#,
        )?;
        let entries = stmt
            .query_map(params![include_inactive], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Enable or disable a catalog entry
    pub fn set_catalog_entry_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE merchant_catalog SET is_active = ? WHERE id = ?",
            params![active, id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Catalog entry {}", id)));
        }
        Ok(())
    }
}
