//! Settle Web Server
//!
//! Axum-based REST API over the settle normalization pipeline.
//!
//! - Restrictive CORS policy
//! - Input validation (pagination limits, body size limits)
//! - Audit logging for every write
//! - Sanitized error responses

use std::sync::{Arc, Mutex};

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info};

use settle_core::db::Database;
use settle_core::{CancellationFlag, PipelineConfig};

mod handlers;

/// Maximum JSON body size for regular requests (64 KB)
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Maximum body size for batch ingestion (10 MB)
pub const MAX_INGEST_SIZE: usize = 10 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Header naming the caller for the audit log
pub const ACTOR_HEADER: &str = "x-settle-actor";

/// Actor recorded when the caller does not name itself
const DEFAULT_ACTOR: &str = "local";

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Tunables for settlement search and discrepancy analysis
    pub pipeline: PipelineConfig,
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// Cancellation handle of the bulk rule pass in flight, if any
    pub bulk_pass: Mutex<Option<CancellationFlag>>,
}

/// Caller identity for audit entries
pub fn get_actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

/// Read and deserialize a JSON body, returning the caller alongside it
pub(crate) async fn read_json<T: DeserializeOwned>(
    request: Request,
    limit: usize,
) -> Result<(String, T), AppError> {
    let actor = get_actor(request.headers());
    let bytes = axum::body::to_bytes(request.into_body(), limit)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let body = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))?;
    Ok((actor, body))
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        bulk_pass: Mutex::new(None),
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Categorization
        .route("/categorize", post(handlers::categorize))
        // Category tree
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route("/categories/tree", get(handlers::get_category_tree))
        .route(
            "/categories/:id",
            get(handlers::get_category).patch(handlers::update_category),
        )
        .route(
            "/categories/:id/descendants",
            get(handlers::get_category_descendants),
        )
        // Rules
        .route("/rules", get(handlers::list_rules).post(handlers::create_rule))
        .route("/rules/apply", post(handlers::apply_rules))
        .route("/rules/apply/cancel", post(handlers::cancel_apply_rules))
        .route("/rules/test", post(handlers::test_rules))
        .route(
            "/rules/:id",
            get(handlers::get_rule)
                .patch(handlers::update_rule)
                .delete(handlers::delete_rule),
        )
        // Merchant catalog
        .route(
            "/catalog",
            get(handlers::list_catalog).post(handlers::create_catalog_entry),
        )
        .route("/catalog/:id/enable", post(handlers::enable_catalog_entry))
        .route("/catalog/:id/disable", post(handlers::disable_catalog_entry))
        // Transactions
        .route("/transactions", get(handlers::list_transactions))
        .route("/transactions/ingest", post(handlers::ingest_transactions))
        .route("/transactions/:id", get(handlers::get_transaction))
        .route(
            "/transactions/:id/category",
            axum::routing::put(handlers::set_transaction_category),
        )
        // Account pairings
        .route(
            "/pairings",
            get(handlers::list_pairings).post(handlers::create_pairing),
        )
        .route("/pairings/candidates", post(handlers::find_candidates))
        .route("/pairings/smart-match", post(handlers::smart_match))
        .route("/pairings/suggest-bank", post(handlers::suggest_bank_account))
        .route(
            "/pairings/:id",
            get(handlers::get_pairing)
                .patch(handlers::update_pairing)
                .delete(handlers::delete_pairing),
        )
        .route(
            "/pairings/:id/discrepancy",
            get(handlers::get_discrepancy),
        )
        .route(
            "/pairings/:id/acknowledge",
            post(handlers::acknowledge_discrepancy),
        )
        // Reports
        .route("/reports/monthly", get(handlers::report_monthly))
        .route("/reports/categories", get(handlers::report_categories))
        .route("/reports/categories/:id", get(handlers::report_category))
        // Audit log
        .route("/audit", get(handlers::list_audit_log));

    // Build CORS layer
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(ACTOR_HEADER)])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(ACTOR_HEADER)])
    };

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let app = create_router(db, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();

        // Caller mistakes surface with their message; store failures stay generic
        if let Some(core) = err.downcast_ref::<settle_core::Error>() {
            let status = match core {
                settle_core::Error::Validation(_) => Some(StatusCode::BAD_REQUEST),
                settle_core::Error::NotFound(_) => Some(StatusCode::NOT_FOUND),
                settle_core::Error::Conflict(_) => Some(StatusCode::CONFLICT),
                _ => None,
            };
            if let Some(status) = status {
                return Self {
                    status,
                    message: core.to_string(),
                    internal: None,
                };
            }
        }

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred".to_string(),
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
