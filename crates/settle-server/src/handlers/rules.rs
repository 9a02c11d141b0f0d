//! Categorization rule handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{get_actor, read_json, AppError, AppState, SuccessResponse, MAX_BODY_SIZE};
use settle_core::models::{CategorizationRule, CategoryMatch, NewRule, RulePatch};
use settle_core::rules::resolve_rule_category;
use settle_core::{
    BulkApplyResult, BulkRuleApplier, CancellationFlag, CategoryResolver, RuleMatcher,
};

#[derive(Debug, Deserialize)]
pub struct RuleListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/rules - Rules, highest priority first
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RuleListQuery>,
) -> Result<Json<Vec<CategorizationRule>>, AppError> {
    Ok(Json(state.db.list_rules(params.include_inactive)?))
}

/// GET /api/rules/:id
pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<CategorizationRule>, AppError> {
    let rule = state
        .db
        .get_rule(id)?
        .ok_or_else(|| AppError::not_found("Rule not found"))?;
    Ok(Json(rule))
}

/// POST /api/rules - Create a rule
///
/// Existing transactions are not touched until the next bulk pass.
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<CategorizationRule>, AppError> {
    let (actor, req): (String, NewRule) = read_json(request, MAX_BODY_SIZE).await?;

    let id = state.db.create_rule(&req)?;
    state.db.log_audit(
        &actor,
        "create",
        Some("rule"),
        Some(id),
        Some(&format!("pattern={}", req.name_pattern.trim())),
    )?;

    let rule = state
        .db
        .get_rule(id)?
        .ok_or_else(|| AppError::internal("Rule not found after creation"))?;
    Ok(Json(rule))
}

/// PATCH /api/rules/:id
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<CategorizationRule>, AppError> {
    let (actor, patch): (String, RulePatch) = read_json(request, MAX_BODY_SIZE).await?;

    if patch.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }

    let rule = state.db.update_rule(id, &patch)?;
    state
        .db
        .log_audit(&actor, "update", Some("rule"), Some(id), None)?;

    Ok(Json(rule))
}

/// DELETE /api/rules/:id
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_rule(id)?;
    state
        .db
        .log_audit(&get_actor(&headers), "delete", Some("rule"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Debug, Deserialize)]
pub struct TestRulesRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct RuleTestMatch {
    pub rule: CategorizationRule,
    pub category: Option<CategoryMatch>,
    /// Why the rule's category could not be resolved
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct TestRulesResponse {
    pub name: String,
    /// Matching active rules in evaluation order; the first one wins
    pub matches: Vec<RuleTestMatch>,
}

/// POST /api/rules/test - Show which rules would claim a name
pub async fn test_rules(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<TestRulesResponse>, AppError> {
    let (_, req): (String, TestRulesRequest) = read_json(request, MAX_BODY_SIZE).await?;

    let matcher = RuleMatcher::load(&state.db)?;
    let resolver = CategoryResolver::new(&state.db);

    let matches = matcher
        .matching(&req.name)
        .into_iter()
        .map(|rule| {
            let (category, error) = match resolve_rule_category(&resolver, rule) {
                Ok(m) => (Some(m), None),
                Err(e) => (None, Some(e.to_string())),
            };
            RuleTestMatch {
                rule: rule.clone(),
                category,
                error,
            }
        })
        .collect();

    Ok(Json(TestRulesResponse {
        name: req.name,
        matches,
    }))
}

/// Clears the running-pass slot once the pass ends, even if the caller went away
struct BulkPassGuard(Arc<AppState>);

impl Drop for BulkPassGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.0.bulk_pass.lock() {
            *running = None;
        }
    }
}

/// POST /api/rules/apply - Run a bulk pass of every active rule
///
/// Only one pass runs at a time; a second request gets 409 until it finishes.
/// The pass runs to completion on the blocking pool if the client disconnects.
pub async fn apply_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<BulkApplyResult>, AppError> {
    let actor = get_actor(&headers);
    let cancel = CancellationFlag::new();
    {
        let mut running = state
            .bulk_pass
            .lock()
            .map_err(|_| AppError::internal("Bulk pass state poisoned"))?;
        if running.is_some() {
            return Err(AppError::conflict("A bulk rule pass is already running"));
        }
        *running = Some(cancel.clone());
    }
    let guard = BulkPassGuard(state.clone());

    let result = tokio::task::spawn_blocking(move || -> settle_core::Result<BulkApplyResult> {
        let guard = guard;
        let db = &guard.0.db;
        let result = BulkRuleApplier::with_cancellation(db, cancel).apply_all()?;

        info!(
            rules = result.rules_applied,
            updated = result.transactions_updated,
            failed = result.failed_rules.len(),
            cancelled = result.cancelled,
            "Bulk rule pass finished"
        );

        db.log_audit(
            &actor,
            "apply_rules",
            Some("rule"),
            None,
            Some(&format!(
                "{} rules, {} transactions",
                result.rules_applied, result.transactions_updated
            )),
        )?;
        Ok(result)
    })
    .await??;

    Ok(Json(result))
}

#[derive(Serialize)]
pub struct CancelResponse {
    /// False when no pass was running
    pub cancelled: bool,
}

/// POST /api/rules/apply/cancel - Stop the running bulk pass before its next rule
pub async fn cancel_apply_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CancelResponse>, AppError> {
    let running = state
        .bulk_pass
        .lock()
        .map_err(|_| AppError::internal("Bulk pass state poisoned"))?
        .clone();

    let cancelled = match running {
        Some(flag) => {
            flag.cancel();
            state
                .db
                .log_audit(&get_actor(&headers), "cancel_apply_rules", Some("rule"), None, None)?;
            true
        }
        None => false,
    };

    Ok(Json(CancelResponse { cancelled }))
}
