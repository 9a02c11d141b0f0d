//! Category tree handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{read_json, AppError, AppState, MAX_BODY_SIZE};
use settle_core::models::{CategoryDefinition, CategoryNode, CategoryPatch, NewCategory};

#[derive(Debug, Deserialize)]
pub struct CategoryListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/categories - Flat list of category definitions
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CategoryListQuery>,
) -> Result<Json<Vec<CategoryDefinition>>, AppError> {
    Ok(Json(state.db.list_categories(params.include_inactive)?))
}

/// GET /api/categories/tree - Active roots with their children
pub async fn get_category_tree(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryNode>>, AppError> {
    Ok(Json(state.db.category_tree()?))
}

/// GET /api/categories/:id
pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CategoryDefinition>, AppError> {
    let category = state
        .db
        .get_category(id)?
        .ok_or_else(|| AppError::not_found("Category not found"))?;
    Ok(Json(category))
}

/// POST /api/categories - Create a category
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<CategoryDefinition>, AppError> {
    let (actor, req): (String, NewCategory) = read_json(request, MAX_BODY_SIZE).await?;

    let id = state.db.create_category(&req)?;
    state.db.log_audit(
        &actor,
        "create",
        Some("category"),
        Some(id),
        Some(&format!("name={}", req.name)),
    )?;

    let category = state
        .db
        .get_category(id)?
        .ok_or_else(|| AppError::internal("Category not found after creation"))?;
    Ok(Json(category))
}

/// PATCH /api/categories/:id - Rename, move, or (de)activate a category
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<CategoryDefinition>, AppError> {
    let (actor, patch): (String, CategoryPatch) = read_json(request, MAX_BODY_SIZE).await?;

    if patch.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }

    let category = state.db.update_category(id, &patch)?;
    state
        .db
        .log_audit(&actor, "update", Some("category"), Some(id), None)?;

    Ok(Json(category))
}

#[derive(Serialize)]
pub struct DescendantsResponse {
    pub category_id: i64,
    /// The category itself and every descendant, by id
    pub ids: Vec<i64>,
}

/// GET /api/categories/:id/descendants
pub async fn get_category_descendants(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DescendantsResponse>, AppError> {
    let ids = state.db.category_descendants(id)?;
    Ok(Json(DescendantsResponse {
        category_id: id,
        ids,
    }))
}
