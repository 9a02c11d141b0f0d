//! Category definition operations
//!
//! The tree shape is enforced here, at write time: no cycles, at most two
//! levels, and children share their parent's category type.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension};
use tracing::info;

use super::{parse_datetime, Database, DbConn};
use crate::error::{Error, Result};
use crate::models::*;

const CATEGORY_COLUMNS: &str =
    "id, name, name_en, parent_id, category_type, is_active, display_order, created_at";

fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<CategoryDefinition> {
    let type_str: String = row.get(4)?;
    let created_at_str: String = row.get(7)?;
    Ok(CategoryDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        name_en: row.get(2)?,
        parent_id: row.get(3)?,
        category_type: type_str.parse().unwrap_or(CategoryType::Expense),
        is_active: row.get::<_, i64>(5)? != 0,
        display_order: row.get(6)?,
        created_at: parse_datetime(&created_at_str),
    })
}

fn fetch_category(conn: &DbConn, id: i64) -> Result<Option<CategoryDefinition>> {
    let sql = format!(
        "SELECT {} FROM category_definitions WHERE id = ?",
        CATEGORY_COLUMNS
    );
    Ok(conn.query_row(&sql, params![id], row_to_category).optional()?)
}

impl Database {
    /// Seed the default two-level category tree (idempotent - skips existing categories)
    pub fn seed_default_categories(&self) -> Result<()> {
        let tree: [(&str, CategoryType, &[&str]); 8] = [
            ("Food", CategoryType::Expense, &["Groceries", "Dining"]),
            ("Transport", CategoryType::Expense, &["Fuel", "Public Transport", "Parking"]),
            ("Housing", CategoryType::Expense, &["Rent", "Utilities"]),
            ("Health", CategoryType::Expense, &["Pharmacy", "Clinics"]),
            ("Shopping", CategoryType::Expense, &["Clothing", "Electronics"]),
            (
                "Financial",
                CategoryType::Expense,
                &["Credit Card Repayment", "Bank & Card Fees"],
            ),
            ("Income", CategoryType::Income, &["Salary", "Refunds"]),
            ("Investments", CategoryType::Investment, &["Savings", "Securities"]),
        ];

        let conn = self.conn()?;
        let mut created = 0;

        for (order, (root, category_type, children)) in tree.iter().enumerate() {
            let root_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM category_definitions WHERE name = ? AND parent_id IS NULL",
                    params![root],
                    |row| row.get(0),
                )
                .optional()?;

            let root_id = match root_id {
                Some(id) => id,
                None => {
                    conn.execute(
                        r#"
                        INSERT INTO category_definitions (name, parent_id, category_type, display_order)
                        VALUES (?, NULL, ?, ?)
                        "#,
                        params![root, category_type.as_str(), order as i32],
                    )?;
                    created += 1;
                    conn.last_insert_rowid()
                }
            };

            for (child_order, child) in children.iter().enumerate() {
                let exists: bool = conn
                    .query_row(
                        "SELECT 1 FROM category_definitions WHERE name = ? AND parent_id = ?",
                        params![child, root_id],
                        |_| Ok(true),
                    )
                    .optional()?
                    .unwrap_or(false);

                if !exists {
                    conn.execute(
                        r#"
                        INSERT INTO category_definitions (name, parent_id, category_type, display_order)
                        VALUES (?, ?, ?, ?)
                        "#,
                        params![child, root_id, category_type.as_str(), child_order as i32],
                    )?;
                    created += 1;
                }
            }
        }

        if created > 0 {
            self.bump_category_generation();
            info!("Seeded {} default categories", created);
        }
        Ok(())
    }

    /// Create a category, enforcing the tree invariants
    pub fn create_category(&self, new: &NewCategory) -> Result<i64> {
        new.validate()?;
        let conn = self.conn()?;

        if let Some(parent_id) = new.parent_id {
            let parent = fetch_category(&conn, parent_id)?.ok_or_else(|| {
                Error::Validation(format!("Unknown parent category: {}", parent_id))
            })?;
            if parent.parent_id.is_some() {
                return Err(Error::Validation(format!(
                    "Category '{}' is already a subcategory; the tree is limited to two levels",
                    parent.name
                )));
            }
            if parent.category_type != new.category_type {
                return Err(Error::Validation(format!(
                    "Category type {} does not match parent '{}' ({})",
                    new.category_type, parent.name, parent.category_type
                )));
            }
        }

        conn.execute(
            r#"
            INSERT INTO category_definitions (name, name_en, parent_id, category_type, display_order)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                new.name.trim(),
                new.name_en.as_deref().map(str::trim).filter(|s| !s.is_empty()),
                new.parent_id,
                new.category_type.as_str(),
                new.display_order,
            ],
        )?;
        let id = conn.last_insert_rowid();

        self.bump_category_generation();
        Ok(id)
    }

    /// Get a category by ID (active or not)
    pub fn get_category(&self, id: i64) -> Result<Option<CategoryDefinition>> {
        let conn = self.conn()?;
        fetch_category(&conn, id)
    }

    /// List categories ordered for display
    pub fn list_categories(&self, include_inactive: bool) -> Result<Vec<CategoryDefinition>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM category_definitions
            WHERE is_active = 1 OR ?1
            ORDER BY display_order, name
            "#,
            CATEGORY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let categories = stmt
            .query_map(params![include_inactive], row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Active roots with their active children
    pub fn category_tree(&self) -> Result<Vec<CategoryNode>> {
        let all = self.list_categories(false)?;

        let mut roots: Vec<CategoryNode> = all
            .iter()
            .filter(|c| c.parent_id.is_none())
            .map(|c| CategoryNode {
                category: c.clone(),
                children: Vec::new(),
            })
            .collect();

        for child in all.iter().filter(|c| c.parent_id.is_some()) {
            if let Some(node) = roots
                .iter_mut()
                .find(|n| Some(n.category.id) == child.parent_id)
            {
                node.children.push(child.clone());
            }
        }

        Ok(roots)
    }

    /// IDs of a category and all its descendants
    ///
    /// Returns `NotFound` if the category does not exist.
    pub fn category_descendants(&self, id: i64) -> Result<Vec<i64>> {
        let conn = self.conn()?;

        if fetch_category(&conn, id)?.is_none() {
            return Err(Error::NotFound(format!("Category {}", id)));
        }

        let mut stmt = conn.prepare(
            r#"
            WITH RECURSIVE category_tree AS (
                SELECT id FROM category_definitions WHERE id = ?
                UNION
                SELECT c.id FROM category_definitions c
                INNER JOIN category_tree ct ON c.parent_id = ct.id
            )
            SELECT id FROM category_tree ORDER BY id
            "#,
        )?;

        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Apply a patch to a category, re-checking the tree invariants
    pub fn update_category(&self, id: i64, patch: &CategoryPatch) -> Result<CategoryDefinition> {
        let conn = self.conn()?;

        let existing = fetch_category(&conn, id)?
            .ok_or_else(|| Error::NotFound(format!("Category {}", id)))?;
        if patch.is_empty() {
            return Ok(existing);
        }

        let mut updated = existing.clone();
        patch.apply_to(&mut updated)?;

        if updated.parent_id != existing.parent_id || updated.category_type != existing.category_type
        {
            check_tree_shape(&conn, &updated)?;
        }

        conn.execute(
            r#"
            UPDATE category_definitions
            SET name = ?, name_en = ?, parent_id = ?, category_type = ?, is_active = ?, display_order = ?
            WHERE id = ?
            "#,
            params![
                updated.name,
                updated.name_en,
                updated.parent_id,
                updated.category_type.as_str(),
                updated.is_active,
                updated.display_order,
                id,
            ],
        )?;

        self.bump_category_generation();
        Ok(updated)
    }
}

/// Validate a category's position in the tree after a proposed change
fn check_tree_shape(conn: &DbConn, category: &CategoryDefinition) -> Result<()> {
    let mut child_stmt = conn.prepare(
        "SELECT category_type FROM category_definitions WHERE parent_id = ?",
    )?;
    let child_types = child_stmt
        .query_map(params![category.id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if let Some(parent_id) = category.parent_id {
        if would_create_cycle(conn, category.id, parent_id)? {
            return Err(Error::Validation(format!(
                "Moving category {} under {} would create a cycle",
                category.id, parent_id
            )));
        }

        let parent = fetch_category(conn, parent_id)?.ok_or_else(|| {
            Error::Validation(format!("Unknown parent category: {}", parent_id))
        })?;
        if parent.parent_id.is_some() {
            return Err(Error::Validation(format!(
                "Category '{}' is already a subcategory; the tree is limited to two levels",
                parent.name
            )));
        }
        if !child_types.is_empty() {
            return Err(Error::Validation(format!(
                "Category '{}' has subcategories and cannot become a subcategory itself",
                category.name
            )));
        }
        if parent.category_type != category.category_type {
            return Err(Error::Validation(format!(
                "Category type {} does not match parent '{}' ({})",
                category.category_type, parent.name, parent.category_type
            )));
        }
    }

    if child_types
        .iter()
        .any(|t| t.as_str() != category.category_type.as_str())
    {
        return Err(Error::Validation(format!(
            "Subcategories of '{}' have a different category type",
            category.name
        )));
    }

    Ok(())
}

/// Walk the parent chain from `new_parent`; a cycle exists if it reaches `id`
fn would_create_cycle(conn: &DbConn, id: i64, new_parent: i64) -> Result<bool> {
    let mut seen = HashSet::new();
    let mut current = Some(new_parent);

    while let Some(node) = current {
        if node == id {
            return Ok(true);
        }
        if !seen.insert(node) {
            // Existing data already loops; refuse to extend it
            return Ok(true);
        }
        current = conn
            .query_row(
                "SELECT parent_id FROM category_definitions WHERE id = ?",
                params![node],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
    }

    Ok(false)
}
