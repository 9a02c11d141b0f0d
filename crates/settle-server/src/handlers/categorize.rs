//! Single-name categorization handler

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    Json,
};

use crate::{read_json, AppError, AppState, MAX_BODY_SIZE};
use settle_core::{CategorizeRequest, CategorizeResult, Categorizer};

/// POST /api/categorize - Categorize one name, committing to a stored row when addressed
pub async fn categorize(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<CategorizeResult>, AppError> {
    let (actor, req): (String, CategorizeRequest) = read_json(request, MAX_BODY_SIZE).await?;

    if req.name.trim().is_empty() {
        return Err(AppError::bad_request("name is required"));
    }

    let categorizer = Categorizer::new(&state.db)?;
    let result = categorizer.categorize_one(&req)?;

    if let (Some(id), true) = (result.transaction_id, result.committed) {
        let category = result.best.as_ref().map(|m| m.category.as_str());
        state
            .db
            .log_audit(&actor, "categorize", Some("transaction"), Some(id), category)?;
    }

    Ok(Json(result))
}
