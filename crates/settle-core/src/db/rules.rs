//! Categorization rule operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database, DbConn};
use crate::error::{Error, Result};
use crate::models::*;

const RULE_COLUMNS: &str = "id, name_pattern, target_category, category_definition_id, priority, \
     is_active, created_at, updated_at";

fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<CategorizationRule> {
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;
    Ok(CategorizationRule {
        id: row.get(0)?,
        name_pattern: row.get(1)?,
        target_category: row.get(2)?,
        category_definition_id: row.get(3)?,
        priority: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

fn fetch_rule(conn: &DbConn, id: i64) -> Result<Option<CategorizationRule>> {
    let sql = format!("SELECT {} FROM categorization_rules WHERE id = ?", RULE_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_rule).optional()?)
}

fn ensure_category_exists(conn: &DbConn, category_id: Option<i64>) -> Result<()> {
    if let Some(id) = category_id {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM category_definitions WHERE id = ?",
                params![id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(Error::Validation(format!("Unknown category: {}", id)));
        }
    }
    Ok(())
}

impl Database {
    /// Create a rule
    pub fn create_rule(&self, new: &NewRule) -> Result<i64> {
        new.validate()?;
        let conn = self.conn()?;
        ensure_category_exists(&conn, new.category_definition_id)?;

        conn.execute(
            r#"
            INSERT INTO categorization_rules (name_pattern, target_category, category_definition_id, priority)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                new.name_pattern.trim(),
                new.target_category
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty()),
                new.category_definition_id,
                new.priority,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a rule by ID
    pub fn get_rule(&self, id: i64) -> Result<Option<CategorizationRule>> {
        let conn = self.conn()?;
        fetch_rule(&conn, id)
    }

    /// List rules, highest priority first
    pub fn list_rules(&self, include_inactive: bool) -> Result<Vec<CategorizationRule>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM categorization_rules
            WHERE is_active = 1 OR ?1
            ORDER BY priority DESC, id
            "#,
            RULE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rules = stmt
            .query_map(params![include_inactive], row_to_rule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Active rules only
    pub fn list_active_rules(&self) -> Result<Vec<CategorizationRule>> {
        self.list_rules(false)
    }

    /// Merge a patch into a rule and write the full row back
    pub fn update_rule(&self, id: i64, patch: &RulePatch) -> Result<CategorizationRule> {
        let conn = self.conn()?;

        let mut rule =
            fetch_rule(&conn, id)?.ok_or_else(|| Error::NotFound(format!("Rule {}", id)))?;
        if patch.is_empty() {
            return Ok(rule);
        }

        patch.apply_to(&mut rule)?;
        ensure_category_exists(&conn, rule.category_definition_id)?;

        conn.execute(
            r#"
            UPDATE categorization_rules
            SET name_pattern = ?, target_category = ?, category_definition_id = ?,
                priority = ?, is_active = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![
                rule.name_pattern,
                rule.target_category,
                rule.category_definition_id,
                rule.priority,
                rule.is_active,
                id,
            ],
        )?;

        fetch_rule(&conn, id)?.ok_or_else(|| Error::NotFound(format!("Rule {}", id)))
    }

    /// Delete a rule; rows it classified keep their category but lose the rule link
    pub fn delete_rule(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM categorization_rules WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Rule {}", id)));
        }
        Ok(())
    }
}
