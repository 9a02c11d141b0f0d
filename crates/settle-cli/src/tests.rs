//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use chrono::NaiveDate;
use settle_core::db::Database;
use settle_core::models::{CategorySource, RawTransaction};
use settle_core::{PipelineConfig, SettlementQuery};

use crate::commands::{self, truncate, RuleChanges};

fn setup_test_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.seed_default_categories().unwrap();
    db
}

fn insert_row(db: &Database, external_id: &str, vendor: &str, description: &str, amount: f64) -> i64 {
    db.insert_transaction(
        &RawTransaction {
            external_id: external_id.into(),
            vendor: vendor.into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            description: description.into(),
            amount,
            raw_category: None,
            account_number: Some("123-456".into()),
            processed_date: None,
            status: None,
        },
        None,
        None,
    )
    .unwrap()
    .id()
}

fn category_id(db: &Database, name: &str) -> i64 {
    db.list_categories(true)
        .unwrap()
        .into_iter()
        .find(|c| c.name == name)
        .unwrap()
        .id
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a long description", 10), "a long ...");
    // multi-byte characters are never split
    assert_eq!(truncate("קפה קפה בע\"מ", 6), "קפה...");
}

#[test]
fn test_parse_date_arg() {
    assert_eq!(
        commands::parse_date_arg(Some("2024-02-29")).unwrap(),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    );
    assert!(commands::parse_date_arg(Some("29/02/2024")).is_err());
    assert!(commands::parse_date_arg(None).is_ok());
}

// ========== Category Command Tests ==========

#[test]
fn test_cmd_categories_list() {
    let db = setup_test_db();
    assert!(commands::cmd_categories_list(&db).is_ok());
}

#[test]
fn test_cmd_categories_add_child() {
    let db = setup_test_db();
    let food = category_id(&db, "Food");
    commands::cmd_categories_add(&db, "Bakery", Some(food), "expense", Some("Bakery"), 3)
        .unwrap();

    let bakery = db
        .list_categories(false)
        .unwrap()
        .into_iter()
        .find(|c| c.name == "Bakery")
        .unwrap();
    assert_eq!(bakery.parent_id, Some(food));
    assert_eq!(bakery.display_order, 3);
}

#[test]
fn test_cmd_categories_add_invalid_type() {
    let db = setup_test_db();
    assert!(commands::cmd_categories_add(&db, "Gifts", None, "gifts", None, 0).is_err());
}

#[test]
fn test_cmd_categories_update_rejects_cycle() {
    let db = setup_test_db();
    let food = category_id(&db, "Food");
    let dining = category_id(&db, "Dining");
    assert!(commands::cmd_categories_update(&db, food, None, Some(Some(dining)), None).is_err());
}

#[test]
fn test_cmd_categories_update_requires_change() {
    let db = setup_test_db();
    let food = category_id(&db, "Food");
    assert!(commands::cmd_categories_update(&db, food, None, None, None).is_err());
}

#[test]
fn test_cmd_categories_descendants() {
    let db = setup_test_db();
    let food = category_id(&db, "Food");
    assert!(commands::cmd_categories_descendants(&db, food).is_ok());
    assert!(commands::cmd_categories_descendants(&db, 999_999).is_err());
}

// ========== Rule Command Tests ==========

#[test]
fn test_cmd_rules_add_and_list() {
    let db = setup_test_db();
    commands::cmd_rules_add(&db, "Cafe", Some("Dining".into()), None, 5).unwrap();

    let rules = db.list_rules(false).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].priority, 5);
    assert!(commands::cmd_rules_list(&db, true).is_ok());

    let audit = db.list_audit_log(10).unwrap();
    assert_eq!(audit[0].action, "create");
    assert_eq!(audit[0].actor, commands::CLI_ACTOR);
}

#[test]
fn test_cmd_rules_add_requires_category() {
    let db = setup_test_db();
    assert!(commands::cmd_rules_add(&db, "Cafe", None, None, 0).is_err());
    assert!(commands::cmd_rules_add(&db, "Cafe", None, Some(424_242), 0).is_err());
}

#[test]
fn test_cmd_rules_update_and_delete() {
    let db = setup_test_db();
    commands::cmd_rules_add(&db, "Cafe", Some("Dining".into()), None, 5).unwrap();
    let id = db.list_rules(false).unwrap()[0].id;

    commands::cmd_rules_update(
        &db,
        id,
        RuleChanges {
            priority: Some(7),
            active: Some(false),
            ..Default::default()
        },
    )
    .unwrap();
    let rule = db.get_rule(id).unwrap().unwrap();
    assert_eq!(rule.priority, 7);
    assert!(!rule.is_active);

    assert!(commands::cmd_rules_update(&db, id, RuleChanges::default()).is_err());

    commands::cmd_rules_delete(&db, id).unwrap();
    assert!(commands::cmd_rules_delete(&db, id).is_err());
}

#[test]
fn test_cmd_rules_test() {
    let db = setup_test_db();
    commands::cmd_rules_add(&db, "Super", Some("Groceries".into()), None, 10).unwrap();
    assert!(commands::cmd_rules_test(&db, "SUPER-PHARM TLV").is_ok());
    assert!(commands::cmd_rules_test(&db, "nothing here").is_ok());
}

#[test]
fn test_cmd_apply_rules() {
    let db = setup_test_db();
    commands::cmd_rules_add(&db, "Cafe", Some("Dining".into()), None, 5).unwrap();
    let id = insert_row(&db, "c1", "bankX", "CAFE CAFE LTD", -35.0);

    commands::cmd_apply_rules(&db).unwrap();

    let tx = db.get_transaction(id).unwrap().unwrap();
    assert_eq!(tx.category.as_deref(), Some("Dining"));
    assert_eq!(tx.confidence_score, 0.8);
}

// ========== Catalog Command Tests ==========

#[test]
fn test_cmd_catalog() {
    let db = setup_test_db();
    commands::cmd_catalog_add(&db, "shufersal", "Food", Some("Groceries"), 0.9).unwrap();
    let id = db.list_catalog_entries(false).unwrap()[0].id;

    commands::cmd_catalog_set_active(&db, id, false).unwrap();
    assert!(db.list_catalog_entries(false).unwrap().is_empty());
    assert!(commands::cmd_catalog_list(&db, true).is_ok());

    assert!(commands::cmd_catalog_add(&db, "x", "Food", None, 1.2).is_err());
}

// ========== Ingest and Categorize Tests ==========

#[test]
fn test_cmd_ingest() {
    let db = setup_test_db();
    commands::cmd_rules_add(&db, "Cafe", Some("Dining".into()), None, 5).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "external_id,vendor,date,description,amount,account_number").unwrap();
    writeln!(file, "x1,bankX,2024-03-01,CAFE CAFE LTD,-35.00,123-456").unwrap();
    writeln!(file, ",bankX,2024-03-02,GROCERY STORE,-120.00,123-456").unwrap();
    file.flush().unwrap();

    commands::cmd_ingest(&db, file.path()).unwrap();
    assert_eq!(db.count_transactions().unwrap(), 2);

    // Re-ingesting the same file is a no-op
    commands::cmd_ingest(&db, file.path()).unwrap();
    assert_eq!(db.count_transactions().unwrap(), 2);

    let tx = db.find_transaction("x1", "bankX").unwrap().unwrap();
    assert_eq!(tx.category_source, Some(CategorySource::Rule));
}

#[test]
fn test_cmd_ingest_missing_file() {
    let db = setup_test_db();
    let result = commands::cmd_ingest(&db, std::path::Path::new("/nonexistent/rows.csv"));
    assert!(result.is_err());
}

#[test]
fn test_cmd_categorize_commits() {
    let db = setup_test_db();
    commands::cmd_rules_add(&db, "Cafe", Some("Dining".into()), None, 5).unwrap();
    let id = insert_row(&db, "c1", "bankX", "CAFE CAFE LTD", -35.0);

    commands::cmd_categorize(&db, "CAFE CAFE LTD", Some("c1"), Some("bankX"), None).unwrap();
    assert_eq!(
        db.get_transaction(id).unwrap().unwrap().category.as_deref(),
        Some("Dining")
    );

    // Unknown target
    assert!(commands::cmd_categorize(&db, "CAFE", Some("nope"), Some("bankX"), None).is_err());
}

#[test]
fn test_cmd_categorize_without_match() {
    let db = setup_test_db();
    assert!(commands::cmd_categorize(&db, "MYSTERY", None, None, None).is_ok());
}

// ========== Transaction Command Tests ==========

#[test]
fn test_cmd_transactions_set_category() {
    let db = setup_test_db();
    let id = insert_row(&db, "c1", "bankX", "CAFE CAFE LTD", -35.0);
    let dining = category_id(&db, "Dining");

    commands::cmd_transactions_set_category(&db, id, dining).unwrap();
    let tx = db.get_transaction(id).unwrap().unwrap();
    assert!(tx.manual_override);
    assert_eq!(tx.category_definition_id, Some(dining));

    assert!(commands::cmd_transactions_set_category(&db, id, 999_999).is_err());
    assert!(commands::cmd_transactions_list(&db, 10).is_ok());
}

// ========== Pairing Command Tests ==========

#[test]
fn test_cmd_pairings_lifecycle() {
    let db = setup_test_db();
    commands::cmd_pairings_add(
        &db,
        "max",
        "bankX",
        Some("7890".into()),
        Some("123-456".into()),
        vec!["MAX".into()],
    )
    .unwrap();
    let id = db.list_pairings(false).unwrap()[0].id;

    commands::cmd_pairings_update(&db, id, vec!["MAX PAYMENT".into()], None, None).unwrap();
    assert_eq!(
        db.get_pairing(id).unwrap().unwrap().match_patterns,
        vec!["MAX PAYMENT"]
    );

    let config = PipelineConfig::default();
    let as_of = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    assert!(commands::cmd_pairings_discrepancy(&db, &config, id, None, as_of).is_ok());

    commands::cmd_pairings_acknowledge(&db, id).unwrap();
    assert!(db.get_pairing(id).unwrap().unwrap().discrepancy_acknowledged);

    commands::cmd_pairings_remove(&db, id).unwrap();
    assert!(db.list_pairings(false).unwrap().is_empty());
    assert!(commands::cmd_pairings_list(&db, true).is_ok());
}

#[test]
fn test_cmd_pairings_add_rejects_empty_patterns() {
    let db = setup_test_db();
    let result = commands::cmd_pairings_add(&db, "max", "bankX", None, None, vec![" ".into()]);
    assert!(result.is_err());
    assert!(db.list_pairings(true).unwrap().is_empty());
}

#[test]
fn test_cmd_pairings_discrepancy_missing() {
    let db = setup_test_db();
    let config = PipelineConfig::default();
    let as_of = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    assert!(commands::cmd_pairings_discrepancy(&db, &config, 42, None, as_of).is_err());
}

#[test]
fn test_cmd_pairings_search() {
    let db = setup_test_db();
    insert_row(&db, "b1", "bankX", "VISA GOLD 7890 SETTLEMENT", -2500.0);
    let config = PipelineConfig::default();

    let query = SettlementQuery {
        credit_card_vendor: "max".into(),
        bank_vendor: "bankX".into(),
        bank_account_number: Some("123-456".into()),
        card_nickname: Some("Visa Gold".into()),
        card_last4: Some("7890".into()),
        ..Default::default()
    };
    assert!(commands::cmd_pairings_candidates(&db, &config, query.clone()).is_ok());
    assert!(commands::cmd_pairings_smart_match(&db, &config, query).is_ok());
    assert!(commands::cmd_pairings_suggest_bank(&db, &config, "max", Some("7890"), None, None).is_ok());

    let invalid = SettlementQuery {
        credit_card_vendor: "max".into(),
        ..Default::default()
    };
    assert!(commands::cmd_pairings_smart_match(&db, &config, invalid).is_err());
}

// ========== Report Command Tests ==========

#[test]
fn test_cmd_reports() {
    let db = setup_test_db();
    insert_row(&db, "g", "bankX", "GROCERY STORE", -120.0);

    assert!(commands::cmd_report_monthly(&db, "2024-03").is_ok());
    assert!(commands::cmd_report_monthly(&db, "March").is_err());

    let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let to = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
    assert!(commands::cmd_report_categories(&db, from, to).is_ok());
    assert!(commands::cmd_report_categories(&db, to, from).is_err());

    let food = category_id(&db, "Food");
    assert!(commands::cmd_report_category(&db, food, from, to, true).is_ok());
    assert!(commands::cmd_report_category(&db, 999_999, from, to, true).is_err());
}

#[test]
fn test_cmd_audit() {
    let db = setup_test_db();
    assert!(commands::cmd_audit(&db, 10).is_ok());
    commands::cmd_rules_add(&db, "Cafe", Some("Dining".into()), None, 5).unwrap();
    assert!(commands::cmd_audit(&db, 10).is_ok());
}
