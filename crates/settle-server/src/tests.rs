//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use settle_core::db::Database;
use tower::ServiceExt;

fn setup_test_app() -> (Router, Database) {
    let db = Database::in_memory().unwrap();
    db.seed_default_categories().unwrap();
    let app = create_router(db.clone(), ServerConfig::default());
    (app, db)
}

async fn get_body_json(response: axum::response::Response) -> Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ACTOR_HEADER, "tester");
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, get_body_json(response).await)
}

fn category_id(db: &Database, name: &str) -> i64 {
    db.list_categories(true)
        .unwrap()
        .into_iter()
        .find(|c| c.name == name)
        .unwrap()
        .id
}

fn march_rows() -> Value {
    json!({
        "transactions": [
            {
                "external_id": "g1",
                "vendor": "bankX",
                "date": "2024-03-05",
                "description": "GROCERY STORE",
                "amount": -120.0,
                "account_number": "123-456"
            },
            {
                "external_id": "c1",
                "vendor": "bankX",
                "date": "2024-03-06",
                "description": "CAFE CAFE LTD",
                "amount": -35.0,
                "account_number": "123-456"
            },
            {
                "external_id": "s1",
                "vendor": "bankX",
                "date": "2024-03-10",
                "description": "MAX PAYMENT 7890",
                "amount": -500.0,
                "account_number": "123-456"
            }
        ]
    })
}

// ========== General Tests ==========

#[tokio::test]
async fn test_health() {
    let (app, _) = setup_test_app();
    let (status, json) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_security_headers() {
    let (app, _) = setup_test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
    let (app, _) = setup_test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/rules")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("Invalid JSON"));
}

#[test]
fn test_get_actor_defaults_to_local() {
    let mut headers = HeaderMap::new();
    assert_eq!(get_actor(&headers), "local");

    headers.insert(ACTOR_HEADER, HeaderValue::from_static("  "));
    assert_eq!(get_actor(&headers), "local");

    headers.insert(ACTOR_HEADER, HeaderValue::from_static("importer"));
    assert_eq!(get_actor(&headers), "importer");
}

#[test]
fn test_core_errors_map_to_status() {
    let cases = [
        (settle_core::Error::Validation("x".into()), StatusCode::BAD_REQUEST),
        (settle_core::Error::NotFound("x".into()), StatusCode::NOT_FOUND),
        (settle_core::Error::Conflict("x".into()), StatusCode::CONFLICT),
        (settle_core::Error::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, expected) in cases {
        let app_err: AppError = err.into();
        assert_eq!(app_err.status, expected);
    }
}

// ========== Category API Tests ==========

#[tokio::test]
async fn test_category_tree() {
    let (app, _) = setup_test_app();
    let (status, json) = send(&app, "GET", "/api/categories/tree", None).await;
    assert_eq!(status, StatusCode::OK);

    let roots = json.as_array().unwrap();
    assert!(!roots.is_empty());
    let food = roots
        .iter()
        .find(|n| n["name"] == "Food")
        .unwrap();
    assert_eq!(food["children"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_create_child_category() {
    let (app, db) = setup_test_app();
    let food = category_id(&db, "Food");

    let (status, json) = send(
        &app,
        "POST",
        "/api/categories",
        Some(json!({ "name": "Bakery", "parent_id": food, "category_type": "expense" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["parent_id"], food);

    let (status, _) = send(
        &app,
        "POST",
        "/api/categories",
        Some(json!({ "name": "Orphan", "parent_id": 999_999, "category_type": "expense" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_category_rejects_cycle() {
    let (app, db) = setup_test_app();
    let food = category_id(&db, "Food");
    let dining = category_id(&db, "Dining");

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/categories/{}", food),
        Some(json!({ "parent_id": dining })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "PATCH", &format!("/api/categories/{}", food), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_category_descendants() {
    let (app, db) = setup_test_app();
    let transport = category_id(&db, "Transport");

    let (status, json) = send(
        &app,
        "GET",
        &format!("/api/categories/{}/descendants", transport),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ids"].as_array().unwrap().len(), 4);

    let (status, _) = send(&app, "GET", "/api/categories/999999/descendants", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ========== Rule API Tests ==========

#[tokio::test]
async fn test_rule_crud() {
    let (app, _) = setup_test_app();

    let (status, rule) = send(
        &app,
        "POST",
        "/api/rules",
        Some(json!({ "name_pattern": " Cafe ", "target_category": "Dining", "priority": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rule["name_pattern"], "Cafe");
    let id = rule["id"].as_i64().unwrap();

    let (status, updated) = send(
        &app,
        "PATCH",
        &format!("/api/rules/{}", id),
        Some(json!({ "priority": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["priority"], 9);

    let (status, _) = send(&app, "PATCH", &format!("/api/rules/{}", id), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "DELETE", &format!("/api/rules/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", &format!("/api/rules/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_rule_validation() {
    let (app, _) = setup_test_app();

    let (status, _) = send(&app, "POST", "/api/rules", Some(json!({ "name_pattern": "Cafe" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/rules",
        Some(json!({ "name_pattern": "Cafe", "category_definition_id": 999_999 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rules_test_endpoint() {
    let (app, _) = setup_test_app();
    send(
        &app,
        "POST",
        "/api/rules",
        Some(json!({ "name_pattern": "cafe", "target_category": "Dining", "priority": 5 })),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/rules/test",
        Some(json!({ "name": "CAFE CAFE LTD" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let matches = json["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["category"]["category"], "Dining");
    assert!(matches[0]["error"].is_null());
}

// ========== Ingest and Bulk Apply Tests ==========

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let (app, db) = setup_test_app();

    let (status, stats) = send(&app, "POST", "/api/transactions/ingest", Some(march_rows())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["inserted"], 3);
    assert_eq!(stats["duplicates"], 0);

    let (_, stats) = send(&app, "POST", "/api/transactions/ingest", Some(march_rows())).await;
    assert_eq!(stats["inserted"], 0);
    assert_eq!(stats["duplicates"], 3);
    assert_eq!(db.count_transactions().unwrap(), 3);

    let (status, json) = send(&app, "GET", "/api/transactions?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    assert_eq!(json["transactions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_apply_rules_updates_existing_rows() {
    let (app, db) = setup_test_app();
    send(&app, "POST", "/api/transactions/ingest", Some(march_rows())).await;
    send(
        &app,
        "POST",
        "/api/rules",
        Some(json!({ "name_pattern": "cafe", "target_category": "Dining", "priority": 5 })),
    )
    .await;

    let (status, result) = send(&app, "POST", "/api/rules/apply", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["rules_applied"], 1);
    assert_eq!(result["transactions_updated"], 1);
    assert_eq!(result["cancelled"], false);

    let tx = db.find_transaction("c1", "bankX").unwrap().unwrap();
    assert_eq!(tx.category.as_deref(), Some("Dining"));

    // A second pass has nothing left to claim
    let (_, result) = send(&app, "POST", "/api/rules/apply", None).await;
    assert_eq!(result["transactions_updated"], 0);
}

#[tokio::test]
async fn test_cancel_without_running_pass() {
    let (app, db) = setup_test_app();

    let (status, json) = send(&app, "POST", "/api/rules/apply/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cancelled"], false);

    // A finished pass releases its slot, so the next one may start
    send(&app, "POST", "/api/rules/apply", None).await;
    let (status, _) = send(&app, "POST", "/api/rules/apply", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(db.list_audit_log(10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_abandoned_apply_releases_its_slot() {
    let (app, db) = setup_test_app();
    send(&app, "POST", "/api/transactions/ingest", Some(march_rows())).await;
    for i in 0..50 {
        db.create_rule(&settle_core::models::NewRule {
            name_pattern: format!("shop {}", i),
            target_category: Some("Dining".into()),
            category_definition_id: None,
            priority: i,
        })
        .unwrap();
    }

    // Client gives up on the first pass almost immediately
    let request = Request::builder()
        .method("POST")
        .uri("/api/rules/apply")
        .body(Body::empty())
        .unwrap();
    let _ = tokio::time::timeout(
        std::time::Duration::from_millis(1),
        app.clone().oneshot(request),
    )
    .await;

    // Once the abandoned pass winds down, a new one is accepted
    let mut status = StatusCode::CONFLICT;
    for _ in 0..100 {
        let (s, _) = send(&app, "POST", "/api/rules/apply", None).await;
        status = s;
        if status != StatusCode::CONFLICT {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_categorize_commits_and_audits() {
    let (app, db) = setup_test_app();
    send(&app, "POST", "/api/transactions/ingest", Some(march_rows())).await;
    send(
        &app,
        "POST",
        "/api/rules",
        Some(json!({ "name_pattern": "cafe", "target_category": "Dining", "priority": 5 })),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/categorize",
        Some(json!({ "name": "CAFE CAFE LTD", "external_id": "c1", "vendor": "bankX" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["committed"], true);
    assert_eq!(json["best"]["category"], "Dining");

    let tx = db.find_transaction("c1", "bankX").unwrap().unwrap();
    assert_eq!(json["transaction_id"], tx.id);

    let (_, audit) = send(&app, "GET", "/api/audit?limit=1", None).await;
    assert_eq!(audit[0]["action"], "categorize");
    assert_eq!(audit[0]["actor"], "tester");
}

#[tokio::test]
async fn test_categorize_validation() {
    let (app, _) = setup_test_app();

    let (status, _) = send(&app, "POST", "/api/categorize", Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/categorize",
        Some(json!({ "name": "CAFE", "external_id": "missing", "vendor": "bankX" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_category_survives_bulk_pass() {
    let (app, db) = setup_test_app();
    send(&app, "POST", "/api/transactions/ingest", Some(march_rows())).await;
    let tx = db.find_transaction("c1", "bankX").unwrap().unwrap();
    let groceries = category_id(&db, "Groceries");

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/api/transactions/{}/category", tx.id),
        Some(json!({ "category_id": groceries })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["manual_override"], true);
    assert_eq!(json["category"], "Groceries");

    send(
        &app,
        "POST",
        "/api/rules",
        Some(json!({ "name_pattern": "cafe", "target_category": "Dining", "priority": 5 })),
    )
    .await;
    send(&app, "POST", "/api/rules/apply", None).await;

    let after = db.get_transaction(tx.id).unwrap().unwrap();
    assert_eq!(after.category.as_deref(), Some("Groceries"));

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/transactions/{}/category", tx.id),
        Some(json!({ "category_id": 999_999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ========== Catalog API Tests ==========

#[tokio::test]
async fn test_catalog_entries() {
    let (app, _) = setup_test_app();

    let (status, entry) = send(
        &app,
        "POST",
        "/api/catalog",
        Some(json!({
            "merchant_pattern": "shufersal",
            "parent_category": "Food",
            "subcategory": "Groceries",
            "confidence": 0.9
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = entry["id"].as_i64().unwrap();

    let (status, _) = send(&app, "POST", &format!("/api/catalog/{}/disable", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, active) = send(&app, "GET", "/api/catalog", None).await;
    assert!(active.as_array().unwrap().is_empty());
    let (_, all) = send(&app, "GET", "/api/catalog?include_inactive=true", None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        "POST",
        "/api/catalog",
        Some(json!({ "merchant_pattern": "x", "parent_category": "Food", "confidence": 1.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ========== Pairing API Tests ==========

#[tokio::test]
async fn test_pairing_lifecycle() {
    let (app, _) = setup_test_app();
    let body = json!({
        "credit_card_vendor": "max",
        "bank_vendor": "bankX",
        "match_patterns": [" MAX PAYMENT ", "MAX PAYMENT"]
    });

    let (status, pairing) = send(&app, "POST", "/api/pairings", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pairing["match_patterns"], json!(["MAX PAYMENT"]));
    let id = pairing["id"].as_i64().unwrap();

    let (status, _) = send(&app, "POST", "/api/pairings", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", &format!("/api/pairings/{}/acknowledge", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, fetched) = send(&app, "GET", &format!("/api/pairings/{}", id), None).await;
    assert_eq!(fetched["discrepancy_acknowledged"], true);

    let (status, _) = send(&app, "DELETE", &format!("/api/pairings/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, active) = send(&app, "GET", "/api/pairings", None).await;
    assert!(active.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_pairing_requires_patterns() {
    let (app, _) = setup_test_app();
    let (status, _) = send(
        &app,
        "POST",
        "/api/pairings",
        Some(json!({ "credit_card_vendor": "max", "bank_vendor": "bankX", "match_patterns": [" "] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_discrepancy_endpoint() {
    let (app, _) = setup_test_app();
    let (_, pairing) = send(
        &app,
        "POST",
        "/api/pairings",
        Some(json!({ "credit_card_vendor": "max", "bank_vendor": "bankX", "match_patterns": ["MAX PAYMENT"] })),
    )
    .await;
    let id = pairing["id"].as_i64().unwrap();

    let (status, report) = send(
        &app,
        "GET",
        &format!("/api/pairings/{}/discrepancy?as_of=2024-04-01&months=3", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(report["cycles"].is_array());

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/pairings/{}/discrepancy?as_of=01-04-2024", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/pairings/999/discrepancy", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_smart_match_endpoint() {
    let (app, _) = setup_test_app();
    send(&app, "POST", "/api/transactions/ingest", Some(march_rows())).await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/pairings/smart-match",
        Some(json!({
            "credit_card_vendor": "max",
            "bank_vendor": "bankX",
            "card_last4": "7890"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["candidates"].is_array());

    let (status, _) = send(
        &app,
        "POST",
        "/api/pairings/smart-match",
        Some(json!({ "credit_card_vendor": "max", "bank_vendor": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/pairings/suggest-bank",
        Some(json!({ "credit_card_vendor": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ========== Report API Tests ==========

#[tokio::test]
async fn test_monthly_report_excludes_settlements() {
    let (app, _) = setup_test_app();
    send(&app, "POST", "/api/transactions/ingest", Some(march_rows())).await;
    send(
        &app,
        "POST",
        "/api/pairings",
        Some(json!({ "credit_card_vendor": "max", "bank_vendor": "bankX", "match_patterns": ["MAX PAYMENT"] })),
    )
    .await;

    let (status, report) = send(&app, "GET", "/api/reports/monthly?period=2024-03", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total"], -155.0);
    assert_eq!(report["transaction_count"], 2);
    assert_eq!(report["excluded_settlements"], 1);
    assert_eq!(report["excluded_amount"], -500.0);

    let (status, _) = send(&app, "GET", "/api/reports/monthly?period=March", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_category_reports() {
    let (app, db) = setup_test_app();
    send(&app, "POST", "/api/transactions/ingest", Some(march_rows())).await;

    let (status, _) = send(
        &app,
        "GET",
        "/api/reports/categories?from=2024-03-01&to=2024-03-31",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "GET",
        "/api/reports/categories?from=2024-03-31&to=2024-03-01",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let food = category_id(&db, "Food");
    let (status, json) = send(
        &app,
        "GET",
        &format!("/api/reports/categories/{}?from=2024-03-01&to=2024-03-31", food),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["category_definition_id"], food);

    let (status, _) = send(&app, "GET", "/api/reports/categories?period=someday", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
