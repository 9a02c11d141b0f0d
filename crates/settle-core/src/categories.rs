//! Category tree resolver
//!
//! Lookups go through a session cache of the whole category table. The cache
//! belongs to one [`CategoryResolver`] and is rebuilt whenever the database's
//! category generation moves, so a write made through any clone of the
//! [`Database`] is visible on the next lookup.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{CategoryDefinition, ResolvedCategory};

struct CategoryCache {
    generation: u64,
    by_id: HashMap<i64, CategoryDefinition>,
}

/// Resolves category references against the category tree
pub struct CategoryResolver<'a> {
    db: &'a Database,
    cache: Mutex<Option<CategoryCache>>,
}

impl<'a> CategoryResolver<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            cache: Mutex::new(None),
        }
    }

    /// Lock the cache, reloading it if it is missing or stale
    fn cache(&self) -> Result<MutexGuard<'_, Option<CategoryCache>>> {
        let mut guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        // Read the generation before loading so a concurrent write forces a reload next time
        let generation = self.db.category_generation();
        let stale = guard
            .as_ref()
            .map_or(true, |cache| cache.generation != generation);

        if stale {
            let by_id = self
                .db
                .list_categories(true)?
                .into_iter()
                .map(|c| (c.id, c))
                .collect::<HashMap<_, _>>();
            debug!("Loaded {} categories (generation {})", by_id.len(), generation);
            *guard = Some(CategoryCache { generation, by_id });
        }

        Ok(guard)
    }

    /// Drop the cache; the next lookup reloads it
    pub fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Resolve an active category by ID
    pub fn resolve_by_id(&self, id: i64) -> Result<ResolvedCategory> {
        let guard = self.cache()?;
        let by_id = match guard.as_ref() {
            Some(cache) => &cache.by_id,
            None => return Err(not_loaded()),
        };

        match by_id.get(&id) {
            Some(category) if category.is_active => Ok(resolved(category, by_id)),
            Some(_) => Err(Error::NotFound(format!("Category {} is inactive", id))),
            None => Err(Error::NotFound(format!("Category {}", id))),
        }
    }

    /// Exact, case-sensitive lookup by name, then by localized name
    ///
    /// When `parent_name` is given the candidate's parent must carry that name.
    /// Root categories win over subcategories of the same name.
    pub fn resolve_by_name(
        &self,
        name: &str,
        parent_name: Option<&str>,
    ) -> Result<Option<ResolvedCategory>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let guard = self.cache()?;
        let by_id = match guard.as_ref() {
            Some(cache) => &cache.by_id,
            None => return Err(not_loaded()),
        };

        let parent_ok = |category: &CategoryDefinition| match parent_name {
            None => true,
            Some(expected) => category
                .parent_id
                .and_then(|pid| by_id.get(&pid))
                .is_some_and(|parent| parent.name == expected),
        };

        let pick = |field: NameField| {
            by_id
                .values()
                .filter(|c| c.is_active && field(c) == Some(name) && parent_ok(c))
                .min_by_key(|c| (c.parent_id.is_some(), c.display_order, c.id))
        };

        let found = pick(primary_name).or_else(|| pick(localized_name));
        Ok(found.map(|category| resolved(category, by_id)))
    }

    /// The category plus every descendant
    pub fn descendants_of(&self, id: i64) -> Result<Vec<i64>> {
        self.db.category_descendants(id)
    }
}

type NameField = fn(&CategoryDefinition) -> Option<&str>;

fn primary_name(category: &CategoryDefinition) -> Option<&str> {
    Some(&category.name)
}

fn localized_name(category: &CategoryDefinition) -> Option<&str> {
    category.name_en.as_deref()
}

fn not_loaded() -> Error {
    Error::NotFound("Category table not loaded".into())
}

fn resolved(
    category: &CategoryDefinition,
    by_id: &HashMap<i64, CategoryDefinition>,
) -> ResolvedCategory {
    ResolvedCategory {
        id: category.id,
        name: category.name.clone(),
        category_type: category.category_type,
        parent_id: category.parent_id,
        parent_name: category
            .parent_id
            .and_then(|pid| by_id.get(&pid))
            .map(|p| p.name.clone()),
    }
}
