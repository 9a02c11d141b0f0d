//! Merchant catalog handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{get_actor, read_json, AppError, AppState, SuccessResponse, MAX_BODY_SIZE};
use settle_core::models::{MerchantCatalogEntry, NewCatalogEntry};

#[derive(Debug, Deserialize)]
pub struct CatalogListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/catalog
pub async fn list_catalog(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CatalogListQuery>,
) -> Result<Json<Vec<MerchantCatalogEntry>>, AppError> {
    Ok(Json(state.db.list_catalog_entries(params.include_inactive)?))
}

/// POST /api/catalog - Add a merchant pattern
pub async fn create_catalog_entry(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<MerchantCatalogEntry>, AppError> {
    let (actor, req): (String, NewCatalogEntry) = read_json(request, MAX_BODY_SIZE).await?;

    let id = state.db.create_catalog_entry(&req)?;
    state.db.log_audit(
        &actor,
        "create",
        Some("catalog_entry"),
        Some(id),
        Some(&format!("pattern={}", req.merchant_pattern)),
    )?;

    let entry = state
        .db
        .list_catalog_entries(true)?
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(|| AppError::internal("Catalog entry not found after creation"))?;
    Ok(Json(entry))
}

fn set_active(
    state: &AppState,
    id: i64,
    active: bool,
    headers: &HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.set_catalog_entry_active(id, active)?;
    let action = if active { "enable" } else { "disable" };
    state
        .db
        .log_audit(&get_actor(headers), action, Some("catalog_entry"), Some(id), None)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/catalog/:id/enable
pub async fn enable_catalog_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    set_active(&state, id, true, &headers)
}

/// POST /api/catalog/:id/disable
pub async fn disable_catalog_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    set_active(&state, id, false, &headers)
}
