//! Account pairing and settlement handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{get_actor, read_json, AppError, AppState, SuccessResponse, MAX_BODY_SIZE};
use settle_core::models::{AccountPairing, NewAccountPairing, PairingPatch};
use settle_core::{
    analyze_discrepancy, BankAccountSuggestion, CandidateSearch, DiscrepancyReport,
    SettlementFinder, SettlementQuery, SmartMatchResult,
};

#[derive(Debug, Deserialize)]
pub struct PairingListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/pairings
pub async fn list_pairings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PairingListQuery>,
) -> Result<Json<Vec<AccountPairing>>, AppError> {
    Ok(Json(state.db.list_pairings(params.include_inactive)?))
}

/// GET /api/pairings/:id
pub async fn get_pairing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AccountPairing>, AppError> {
    let pairing = state
        .db
        .get_pairing(id)?
        .ok_or_else(|| AppError::not_found("Pairing not found"))?;
    Ok(Json(pairing))
}

/// POST /api/pairings - Declare which bank debits settle a card
pub async fn create_pairing(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<AccountPairing>, AppError> {
    let (actor, req): (String, NewAccountPairing) = read_json(request, MAX_BODY_SIZE).await?;

    let pairing = state.db.create_pairing(&req)?;
    state.db.log_audit(
        &actor,
        "create",
        Some("pairing"),
        Some(pairing.id),
        Some(&format!(
            "{} <= {}",
            pairing.credit_card_vendor, pairing.bank_vendor
        )),
    )?;

    Ok(Json(pairing))
}

/// PATCH /api/pairings/:id
pub async fn update_pairing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<AccountPairing>, AppError> {
    let (actor, patch): (String, PairingPatch) = read_json(request, MAX_BODY_SIZE).await?;

    let pairing = state.db.update_pairing(id, &patch)?;
    state
        .db
        .log_audit(&actor, "update", Some("pairing"), Some(id), None)?;

    Ok(Json(pairing))
}

/// DELETE /api/pairings/:id - Deactivate; history keeps the row
pub async fn delete_pairing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.deactivate_pairing(id)?;
    state
        .db
        .log_audit(&get_actor(&headers), "deactivate", Some("pairing"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/pairings/candidates - Bank rows that may settle a card
pub async fn find_candidates(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<CandidateSearch>, AppError> {
    let (_, query): (String, SettlementQuery) = read_json(request, MAX_BODY_SIZE).await?;

    let finder = SettlementFinder::new(&state.db, &state.config.pipeline.settlement);
    Ok(Json(finder.find_settlement_candidates(&query)?))
}

/// POST /api/pairings/smart-match - Ranked candidates with suggested patterns
pub async fn smart_match(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<SmartMatchResult>, AppError> {
    let (_, query): (String, SettlementQuery) = read_json(request, MAX_BODY_SIZE).await?;

    let finder = SettlementFinder::new(&state.db, &state.config.pipeline.settlement);
    Ok(Json(finder.smart_match(&query)?))
}

#[derive(Debug, Deserialize)]
pub struct SuggestBankRequest {
    pub credit_card_vendor: String,
    #[serde(default)]
    pub credit_card_account_number: Option<String>,
    #[serde(default)]
    pub bank_vendor: Option<String>,
    #[serde(default)]
    pub bank_account_number: Option<String>,
}

/// POST /api/pairings/suggest-bank - Guess the bank account that pays a card
///
/// Responds with `null` when no bank debit looks like a repayment.
pub async fn suggest_bank_account(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Option<BankAccountSuggestion>>, AppError> {
    let (_, req): (String, SuggestBankRequest) = read_json(request, MAX_BODY_SIZE).await?;

    let finder = SettlementFinder::new(&state.db, &state.config.pipeline.settlement);
    let suggestion = finder.suggest_bank_account(
        &req.credit_card_vendor,
        req.credit_card_account_number.as_deref(),
        req.bank_vendor.as_deref(),
        req.bank_account_number.as_deref(),
    )?;
    Ok(Json(suggestion))
}

#[derive(Debug, Deserialize)]
pub struct DiscrepancyQuery {
    pub months: Option<u32>,
    /// YYYY-MM-DD, defaults to today
    pub as_of: Option<String>,
}

/// GET /api/pairings/:id/discrepancy - Per-cycle bank vs card comparison
pub async fn get_discrepancy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<DiscrepancyQuery>,
) -> Result<Json<DiscrepancyReport>, AppError> {
    let as_of = match params.as_of.as_deref() {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| AppError::bad_request("Invalid as_of date. Use YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };

    let pairing = state
        .db
        .get_pairing(id)?
        .ok_or_else(|| AppError::not_found("Pairing not found"))?;

    let config = &state.config.pipeline.discrepancy;
    let months = params.months.unwrap_or(config.months_back);
    let report = analyze_discrepancy(&state.db, config, &pairing, as_of, months)?;

    Ok(Json(report))
}

/// POST /api/pairings/:id/acknowledge - Accept the current discrepancy
pub async fn acknowledge_discrepancy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.acknowledge_discrepancy(id)?;
    state
        .db
        .log_audit(&get_actor(&headers), "acknowledge", Some("pairing"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}
