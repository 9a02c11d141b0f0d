//! Category tree command implementations

use anyhow::Result;
use settle_core::db::Database;
use settle_core::models::{CategoryPatch, CategoryType, NewCategory};

use super::CLI_ACTOR;

pub fn cmd_categories_list(db: &Database) -> Result<()> {
    let tree = db.category_tree()?;

    if tree.is_empty() {
        println!("No categories found. Run 'settle init' to seed default categories.");
        return Ok(());
    }

    println!();
    println!("🗂️  Categories");
    println!("   ─────────────────────────────────────────────────────────────");

    for node in &tree {
        println!(
            "   [{}] {} ({})",
            node.category.id, node.category.name, node.category.category_type
        );
        for child in &node.children {
            let localized = child
                .name_en
                .as_ref()
                .map(|n| format!(" / {}", n))
                .unwrap_or_default();
            println!("     [{}] • {}{}", child.id, child.name, localized);
        }
    }

    Ok(())
}

pub fn cmd_categories_add(
    db: &Database,
    name: &str,
    parent_id: Option<i64>,
    category_type: &str,
    name_en: Option<&str>,
    display_order: i32,
) -> Result<()> {
    let category_type: CategoryType = category_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let id = db.create_category(&NewCategory {
        name: name.to_string(),
        name_en: name_en.map(String::from),
        parent_id,
        category_type,
        display_order,
    })?;
    db.log_audit(CLI_ACTOR, "create", Some("category"), Some(id), Some(name))?;

    println!("✅ Created category '{}' (id: {})", name, id);
    Ok(())
}

/// `parent`: `Some(None)` moves the category to the root level
pub fn cmd_categories_update(
    db: &Database,
    id: i64,
    name: Option<String>,
    parent: Option<Option<i64>>,
    active: Option<bool>,
) -> Result<()> {
    let patch = CategoryPatch {
        name,
        parent_id: parent,
        is_active: active,
        ..Default::default()
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to update. Use --name, --parent, --root, --activate or --deactivate.");
    }

    let updated = db.update_category(id, &patch)?;
    db.log_audit(CLI_ACTOR, "update", Some("category"), Some(id), None)?;

    let position = match updated.parent_id {
        Some(parent_id) => format!("under category {}", parent_id),
        None => "at the root".to_string(),
    };
    println!(
        "✅ Updated category '{}' ({}, {})",
        updated.name,
        position,
        if updated.is_active { "active" } else { "inactive" }
    );
    Ok(())
}

pub fn cmd_categories_descendants(db: &Database, id: i64) -> Result<()> {
    let ids = db.category_descendants(id)?;

    println!();
    println!("🌳 Category {} and descendants", id);
    for descendant in ids {
        if let Some(category) = db.get_category(descendant)? {
            println!("   [{}] {}", category.id, category.name);
        }
    }

    Ok(())
}
