//! Transaction handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{read_json, AppError, AppState, MAX_BODY_SIZE, MAX_INGEST_SIZE, MAX_PAGE_LIMIT};
use settle_core::models::{RawTransaction, Transaction};
use settle_core::{CategoryResolver, Categorizer, IngestStats};

/// Query parameters for listing transactions
#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub transactions: Vec<Transaction>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// GET /api/transactions - Newest first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionQuery>,
) -> Result<Json<TransactionResponse>, AppError> {
    // Input validation: clamp pagination parameters
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.max(0);

    let transactions = state.db.list_transactions(limit, offset)?;
    let total = state.db.count_transactions()?;

    Ok(Json(TransactionResponse {
        transactions,
        total,
        limit,
        offset,
    }))
}

/// GET /api/transactions/:id
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;
    Ok(Json(tx))
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub transactions: Vec<RawTransaction>,
}

/// POST /api/transactions/ingest - Insert raw rows, categorizing each on the way in
///
/// Rows already stored under the same `(external_id, vendor)` are skipped.
pub async fn ingest_transactions(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<IngestStats>, AppError> {
    let (actor, req): (String, IngestRequest) = read_json(request, MAX_INGEST_SIZE).await?;

    let db = state.db.clone();
    let rows = req.transactions;
    let stats = tokio::task::spawn_blocking(move || {
        let categorizer = Categorizer::new(&db)?;
        categorizer.ingest_batch(&rows)
    })
    .await??;

    state.db.log_audit(
        &actor,
        "ingest",
        Some("transaction"),
        None,
        Some(&format!(
            "{} inserted, {} duplicates",
            stats.inserted, stats.duplicates
        )),
    )?;

    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct SetCategoryRequest {
    pub category_id: i64,
}

/// PUT /api/transactions/:id/category - Manual classification; bulk passes never override it
pub async fn set_transaction_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Transaction>, AppError> {
    let (actor, req): (String, SetCategoryRequest) = read_json(request, MAX_BODY_SIZE).await?;

    let resolver = CategoryResolver::new(&state.db);
    let category = resolver.resolve_by_id(req.category_id)?;
    state.db.set_manual_category(id, &category)?;

    state.db.log_audit(
        &actor,
        "set_category",
        Some("transaction"),
        Some(id),
        Some(&category.name),
    )?;

    let tx = state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;
    Ok(Json(tx))
}
