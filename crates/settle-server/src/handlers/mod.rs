//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod audit;
pub mod catalog;
pub mod categories;
pub mod categorize;
pub mod pairings;
pub mod reports;
pub mod rules;
pub mod transactions;

// Re-export all handlers for use in router
pub use audit::*;
pub use catalog::*;
pub use categories::*;
pub use categorize::*;
pub use pairings::*;
pub use reports::*;
pub use rules::*;
pub use transactions::*;

use axum::Json;

/// GET /api/health - Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
