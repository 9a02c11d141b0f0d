//! Integration tests for settle-core
//!
//! These tests exercise the full ingest → categorize → bulk apply → report workflow.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use settle_core::{
    analyze_discrepancy,
    db::Database,
    models::{
        CategoryMatch, CategorySource, CategoryType, NewAccountPairing, NewCatalogEntry, NewRule,
        RawTransaction,
    },
    read_raw_csv, BulkProgressCallback, BulkRuleApplier, CancellationFlag, Categorizer,
    CategoryResolver, CycleStatus, MatchReason, PipelineConfig, SettlementFinder,
    SettlementQuery,
};

fn setup_db() -> Database {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    db.seed_default_categories().expect("Failed to seed categories");
    db
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn bank_row(external_id: &str, description: &str, amount: f64, day: NaiveDate) -> RawTransaction {
    RawTransaction {
        external_id: external_id.into(),
        vendor: "bankX".into(),
        date: day,
        description: description.into(),
        amount,
        raw_category: None,
        account_number: Some("123-456".into()),
        processed_date: None,
        status: None,
    }
}

fn card_row(external_id: &str, description: &str, amount: f64, billed: NaiveDate) -> RawTransaction {
    RawTransaction {
        external_id: external_id.into(),
        vendor: "max".into(),
        date: billed.pred_opt().expect("valid date"),
        description: description.into(),
        amount,
        raw_category: None,
        account_number: Some("7890".into()),
        processed_date: Some(billed),
        status: None,
    }
}

fn rule(db: &Database, pattern: &str, target: &str, priority: i32) -> i64 {
    db.create_rule(&NewRule {
        name_pattern: pattern.into(),
        target_category: Some(target.into()),
        category_definition_id: None,
        priority,
    })
    .expect("Failed to create rule")
}

fn insert_plain(db: &Database, raw: &RawTransaction) -> i64 {
    db.insert_transaction(raw, None, None)
        .expect("Failed to insert transaction")
        .id()
}

fn category_id(db: &Database, name: &str) -> i64 {
    db.list_categories(true)
        .expect("Failed to list categories")
        .into_iter()
        .find(|c| c.name == name)
        .map(|c| c.id)
        .expect("category exists")
}

// =============================================================================
// Bulk Rule Application
// =============================================================================

#[test]
fn test_cafe_rule_bulk_apply() {
    let db = setup_db();
    rule(&db, "Cafe", "Dining", 5);
    let id = insert_plain(&db, &bank_row("c1", "CAFE CAFE LTD", -35.0, date(2024, 3, 3)));

    let result = BulkRuleApplier::new(&db).apply_all().expect("bulk pass");
    assert_eq!(result.rules_applied, 1);
    assert_eq!(result.transactions_updated, 1);
    assert!(result.failed_rules.is_empty());

    let tx = db.get_transaction(id).unwrap().unwrap();
    assert_eq!(tx.category.as_deref(), Some("Dining"));
    assert_eq!(tx.category_definition_id, Some(category_id(&db, "Dining")));
    assert_eq!(tx.confidence_score, 0.8);
    assert_eq!(tx.category_source, Some(CategorySource::Rule));
    assert!(tx.auto_categorized);
}

#[test]
fn test_bulk_apply_is_idempotent() {
    let db = setup_db();
    rule(&db, "Cafe", "Dining", 5);
    rule(&db, "Super", "Groceries", 10);
    rule(&db, "Super-Pharm", "Pharmacy", 20);
    rule(&db, "Parking", "Parking", 0);

    for (i, name) in ["CAFE NOIR", "SUPER-PHARM TLV", "SUPER YUDA", "CITY PARKING", "KIOSK"]
        .iter()
        .enumerate()
    {
        insert_plain(&db, &bank_row(&format!("r{}", i), name, -20.0, date(2024, 3, 1)));
    }

    let applier = BulkRuleApplier::new(&db);
    let first = applier.apply_all().expect("first pass");
    assert_eq!(first.rules_applied, 4);
    assert_eq!(first.transactions_updated, 4);

    let second = applier.apply_all().expect("second pass");
    assert_eq!(second.rules_applied, 4);
    assert_eq!(second.transactions_updated, 0);
}

#[test]
fn test_priority_ordering() {
    let db = setup_db();
    rule(&db, "Super", "Groceries", 10);
    let r2 = rule(&db, "Super-Pharm", "Pharmacy", 20);
    let id = insert_plain(&db, &bank_row("sp", "SUPER-PHARM TLV", -80.0, date(2024, 3, 1)));

    BulkRuleApplier::new(&db).apply_all().expect("bulk pass");

    let tx = db.get_transaction(id).unwrap().unwrap();
    assert_eq!(tx.matched_rule_id, Some(r2));
    assert_eq!(tx.category.as_deref(), Some("Pharmacy"));

    let categorizer = Categorizer::new(&db).unwrap();
    let m = categorizer
        .resolve_category(None, "SUPER-PHARM TLV")
        .unwrap()
        .expect("rule match");
    assert_eq!(m.rule_id, Some(r2));
}

#[test]
fn test_specificity_tie_break() {
    let db = setup_db();
    rule(&db, "Super", "Groceries", 10);
    let r3 = rule(&db, "Super-Pharm", "Pharmacy", 10);
    let id = insert_plain(&db, &bank_row("sp", "SUPER-PHARM TLV", -80.0, date(2024, 3, 1)));

    BulkRuleApplier::new(&db).apply_all().expect("bulk pass");

    let tx = db.get_transaction(id).unwrap().unwrap();
    assert_eq!(tx.matched_rule_id, Some(r3));
    assert_eq!(tx.category.as_deref(), Some("Pharmacy"));
}

#[test]
fn test_edited_rule_reclaims_its_rows() {
    let db = setup_db();
    let cafe = rule(&db, "Cafe", "Dining", 5);
    let id = insert_plain(&db, &bank_row("c1", "CAFE CAFE LTD", -35.0, date(2024, 3, 3)));
    BulkRuleApplier::new(&db).apply_all().unwrap();

    db.update_rule(
        cafe,
        &settle_core::models::RulePatch {
            category_definition_id: Some(Some(category_id(&db, "Groceries"))),
            ..Default::default()
        },
    )
    .unwrap();

    let result = BulkRuleApplier::new(&db).apply_all().unwrap();
    assert_eq!(result.transactions_updated, 1);
    assert_eq!(
        db.get_transaction(id).unwrap().unwrap().category.as_deref(),
        Some("Groceries")
    );
}

#[test]
fn test_narrowed_rule_releases_rows_to_lower_rules() {
    let db = setup_db();
    let pharm = rule(&db, "Super", "Pharmacy", 20);
    rule(&db, "Super", "Groceries", 10);
    let id = insert_plain(&db, &bank_row("s1", "SUPERMARKET TLV", -80.0, date(2024, 3, 4)));

    BulkRuleApplier::new(&db).apply_all().unwrap();
    let tx = db.get_transaction(id).unwrap().unwrap();
    assert_eq!(tx.category.as_deref(), Some("Pharmacy"));

    db.update_rule(
        pharm,
        &settle_core::models::RulePatch {
            name_pattern: Some("Super-Pharm".into()),
            ..Default::default()
        },
    )
    .unwrap();

    let result = BulkRuleApplier::new(&db).apply_all().unwrap();
    assert_eq!(result.transactions_updated, 1);
    let tx = db.get_transaction(id).unwrap().unwrap();
    assert_eq!(tx.category.as_deref(), Some("Groceries"));

    // Same answer as categorizing the row from scratch
    let fresh = Categorizer::new(&db).unwrap();
    let m = fresh
        .resolve_category(None, "SUPERMARKET TLV")
        .unwrap()
        .expect("rule match");
    assert_eq!(m.category, "Groceries");

    let again = BulkRuleApplier::new(&db).apply_all().unwrap();
    assert_eq!(again.transactions_updated, 0);
}

#[test]
fn test_bulk_never_downgrades() {
    let db = setup_db();
    rule(&db, "Shufersal", "Dining", 50);
    rule(&db, "Acme", "Dining", 50);
    rule(&db, "Bakery", "Dining", 50);

    // Catalog classification above rule confidence
    let catalog_match = CategoryMatch {
        category_definition_id: Some(category_id(&db, "Groceries")),
        category: "Groceries".into(),
        category_type: CategoryType::Expense,
        confidence: 0.95,
        source: CategorySource::Catalog,
        rule_id: None,
        catalog_entry_id: Some(1),
    };
    let catalog_id = db
        .insert_transaction(
            &bank_row("cat", "SHUFERSAL DEAL", -300.0, date(2024, 3, 2)),
            None,
            Some(&catalog_match),
        )
        .unwrap()
        .id();

    // Income row classified by name lookup
    let salary_match = CategoryMatch {
        category_definition_id: Some(category_id(&db, "Salary")),
        category: "Salary".into(),
        category_type: CategoryType::Income,
        confidence: 0.75,
        source: CategorySource::Name,
        rule_id: None,
        catalog_entry_id: None,
    };
    let income_id = db
        .insert_transaction(
            &bank_row("inc", "ACME PAYROLL", 9000.0, date(2024, 3, 2)),
            None,
            Some(&salary_match),
        )
        .unwrap()
        .id();

    // Manual override
    let manual_id = insert_plain(&db, &bank_row("man", "BAKERY ROTHSCHILD", -40.0, date(2024, 3, 2)));
    let resolver = CategoryResolver::new(&db);
    let groceries = resolver
        .resolve_by_id(category_id(&db, "Groceries"))
        .unwrap();
    db.set_manual_category(manual_id, &groceries).unwrap();

    let result = BulkRuleApplier::new(&db).apply_all().expect("bulk pass");
    assert_eq!(result.rules_applied, 3);
    assert_eq!(result.transactions_updated, 0);

    let catalog_tx = db.get_transaction(catalog_id).unwrap().unwrap();
    assert_eq!(catalog_tx.category.as_deref(), Some("Groceries"));
    assert_eq!(catalog_tx.confidence_score, 0.95);

    let income_tx = db.get_transaction(income_id).unwrap().unwrap();
    assert_eq!(income_tx.category.as_deref(), Some("Salary"));
    assert_eq!(income_tx.category_type, Some(CategoryType::Income));

    let manual_tx = db.get_transaction(manual_id).unwrap().unwrap();
    assert!(manual_tx.manual_override);
    assert_eq!(manual_tx.category.as_deref(), Some("Groceries"));
}

#[test]
fn test_failed_rule_is_isolated() {
    let db = setup_db();
    let parking = category_id(&db, "Parking");
    let broken = db
        .create_rule(&NewRule {
            name_pattern: "Ahuzot".into(),
            target_category: None,
            category_definition_id: Some(parking),
            priority: 100,
        })
        .unwrap();
    rule(&db, "Cafe", "Dining", 5);
    db.update_category(
        parking,
        &settle_core::models::CategoryPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .unwrap();

    let cafe_id = insert_plain(&db, &bank_row("c1", "CAFE LUNA", -35.0, date(2024, 3, 3)));
    let parking_id = insert_plain(&db, &bank_row("p1", "AHUZOT HOF", -12.0, date(2024, 3, 3)));

    let result = BulkRuleApplier::new(&db).apply_all().expect("bulk pass");
    assert_eq!(result.rules_applied, 1);
    assert_eq!(result.failed_rules.len(), 1);
    assert_eq!(result.failed_rules[0].rule_id, broken);

    assert_eq!(
        db.get_transaction(cafe_id).unwrap().unwrap().category.as_deref(),
        Some("Dining")
    );
    assert_eq!(db.get_transaction(parking_id).unwrap().unwrap().category, None);
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_pre_cancelled_pass_applies_nothing() {
    let db = setup_db();
    rule(&db, "Cafe", "Dining", 5);
    let id = insert_plain(&db, &bank_row("c1", "CAFE CAFE LTD", -35.0, date(2024, 3, 3)));

    let flag = CancellationFlag::new();
    flag.cancel();
    let result = BulkRuleApplier::with_cancellation(&db, flag)
        .apply_all()
        .expect("bulk pass");

    assert!(result.cancelled);
    assert_eq!(result.rules_applied, 0);
    assert_eq!(result.transactions_updated, 0);
    assert_eq!(db.get_transaction(id).unwrap().unwrap().category, None);
}

#[test]
fn test_cancel_between_rules() {
    let db = setup_db();
    rule(&db, "Super-Pharm", "Pharmacy", 20);
    rule(&db, "Cafe", "Dining", 5);
    let pharm = insert_plain(&db, &bank_row("a", "SUPER-PHARM TLV", -80.0, date(2024, 3, 1)));
    let cafe = insert_plain(&db, &bank_row("b", "CAFE NOIR", -20.0, date(2024, 3, 1)));

    let applier = BulkRuleApplier::new(&db);
    let flag = applier.cancellation();
    let seen: Arc<Mutex<Vec<(i64, i64)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in_cb = Arc::clone(&seen);
    let progress: BulkProgressCallback = Box::new(move |current, total| {
        seen_in_cb.lock().unwrap().push((current, total));
        flag.cancel();
    });

    let result = applier
        .apply_all_with_progress(Some(&progress))
        .expect("bulk pass");

    assert!(result.cancelled);
    assert_eq!(result.rules_applied, 1);
    assert_eq!(*seen.lock().unwrap(), vec![(1, 2)]);

    // The first rule committed, the second never ran
    assert_eq!(
        db.get_transaction(pharm).unwrap().unwrap().category.as_deref(),
        Some("Pharmacy")
    );
    assert_eq!(db.get_transaction(cafe).unwrap().unwrap().category, None);
}

// =============================================================================
// Ingestion
// =============================================================================

#[test]
fn test_ingest_fallback_chain() {
    let db = setup_db();
    rule(&db, "Cafe", "Dining", 5);
    db.create_catalog_entry(&NewCatalogEntry {
        merchant_pattern: "shufersal".into(),
        parent_category: "Food".into(),
        subcategory: Some("Groceries".into()),
        confidence: 0.9,
    })
    .unwrap();

    let mut by_rule = bank_row("", "CAFE CAFE LTD", -35.0, date(2024, 3, 3));
    by_rule.raw_category = Some("Pharmacy".into());
    let by_catalog = bank_row("", "SHUFERSAL", -200.0, date(2024, 3, 3));
    let mut by_name = bank_row("", "SOME CLINIC", -150.0, date(2024, 3, 3));
    by_name.raw_category = Some("Clinics".into());
    let unmatched = bank_row("", "MYSTERY", -1.0, date(2024, 3, 3));

    let categorizer = Categorizer::new(&db).unwrap();
    let stats = categorizer
        .ingest_batch(&[by_rule, by_catalog, by_name, unmatched])
        .expect("ingest");
    assert_eq!(stats.inserted, 4);
    assert_eq!(stats.categorized, 3);
    assert_eq!(stats.uncategorized, 1);

    let rows = db.list_transactions(10, 0).unwrap();
    let find = |desc: &str| rows.iter().find(|t| t.description == desc).unwrap();

    assert_eq!(find("CAFE CAFE LTD").category_source, Some(CategorySource::Rule));
    assert_eq!(find("CAFE CAFE LTD").category.as_deref(), Some("Dining"));
    assert_eq!(find("SHUFERSAL").category_source, Some(CategorySource::Catalog));
    assert_eq!(find("SHUFERSAL").category.as_deref(), Some("Groceries"));
    assert!(find("SHUFERSAL").confidence_score <= 0.9);
    assert_eq!(find("SOME CLINIC").category_source, Some(CategorySource::Name));
    assert_eq!(find("MYSTERY").category, None);
    assert_eq!(find("MYSTERY").confidence_score, 0.0);
}

#[test]
fn test_csv_ingest_is_idempotent() {
    let db = setup_db();
    rule(&db, "Cafe", "Dining", 5);

    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "external_id,vendor,date,description,amount,raw_category,account_number,processed_date,status"
    )
    .unwrap();
    writeln!(file, "a1,bankX,2024-03-01,CAFE CAFE LTD,-35.00,,123-456,,completed").unwrap();
    writeln!(file, ",bankX,2024-03-02,GROCERY STORE,-120.00,,123-456,,").unwrap();
    writeln!(file, ",max,2024-03-03,PENDING THING,-9.90,,7890,,pending").unwrap();
    file.flush().unwrap();

    let rows = read_raw_csv(std::fs::File::open(file.path()).unwrap()).expect("parse csv");
    assert_eq!(rows.len(), 3);

    let categorizer = Categorizer::new(&db).unwrap();
    let first = categorizer.ingest_batch(&rows).unwrap();
    assert_eq!(first.inserted, 3);
    assert_eq!(first.categorized, 1);

    // Re-reading the same export must not create new ledger rows
    let second = categorizer.ingest_batch(&rows).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 3);
    assert_eq!(db.count_transactions().unwrap(), 3);
}

// =============================================================================
// Settlement Exclusion and Reports
// =============================================================================

#[test]
fn test_settlement_exclusion_in_monthly_report() {
    let db = setup_db();
    db.create_pairing(&NewAccountPairing {
        credit_card_vendor: "max".into(),
        credit_card_account_number: None,
        bank_vendor: "bankX".into(),
        bank_account_number: None,
        match_patterns: vec!["LOAN REPAYMENT CARD".into()],
    })
    .unwrap();

    insert_plain(&db, &bank_row("s", "LOAN REPAYMENT CARD 1234", -500.0, date(2024, 5, 2)));
    insert_plain(&db, &bank_row("g", "GROCERY STORE", -120.0, date(2024, 5, 3)));

    let report = db.monthly_expenses("2024-05").unwrap();
    assert_eq!(report.total, -120.0);
    assert_eq!(report.transaction_count, 1);
    assert_eq!(report.excluded_settlements, 1);

    // The ledger still holds both rows
    assert_eq!(db.count_transactions().unwrap(), 2);
}

#[test]
fn test_tree_closure() {
    let db = setup_db();
    let resolver = CategoryResolver::new(&db);
    let food = category_id(&db, "Food");

    let mut ids = resolver.descendants_of(food).unwrap();
    ids.sort();
    let mut expected = vec![food, category_id(&db, "Groceries"), category_id(&db, "Dining")];
    expected.sort();
    assert_eq!(ids, expected);
}

// =============================================================================
// Smart Match
// =============================================================================

fn seed_bank_account(db: &Database) {
    insert_plain(db, &bank_row("b1", "VISA GOLD 7890 SETTLEMENT", -2500.0, date(2024, 3, 10)));
    insert_plain(db, &bank_row("b2", "GOLD GYM", -150.0, date(2024, 3, 12)));
    insert_plain(db, &bank_row("b3", "ELECTRIC COMPANY", -400.0, date(2024, 3, 14)));

    let repayment = CategoryMatch {
        category_definition_id: Some(category_id(db, "Credit Card Repayment")),
        category: "Credit Card Repayment".into(),
        category_type: CategoryType::Expense,
        confidence: 0.8,
        source: CategorySource::Rule,
        rule_id: None,
        catalog_entry_id: None,
    };
    db.insert_transaction(
        &bank_row("b4", "HOK 55", -3000.0, date(2024, 2, 10)),
        None,
        Some(&repayment),
    )
    .unwrap();

    // Same description on another account of the same bank
    let mut elsewhere = bank_row("b5", "VISA GOLD 7890 SETTLEMENT", -900.0, date(2024, 3, 10));
    elsewhere.account_number = Some("999-999".into());
    insert_plain(db, &elsewhere);
}

#[test]
fn test_smart_match_ranks_account_number_first() {
    let db = setup_db();
    seed_bank_account(&db);
    let config = PipelineConfig::default();
    let finder = SettlementFinder::new(&db, &config.settlement);

    let result = finder
        .smart_match(&SettlementQuery {
            credit_card_vendor: "max".into(),
            credit_card_account_number: None,
            bank_vendor: "bankX".into(),
            bank_account_number: Some("123-456".into()),
            card_nickname: Some("Visa Gold".into()),
            card_last4: Some("7890".into()),
        })
        .expect("smart match");

    let names: Vec<&str> = result
        .candidates
        .iter()
        .map(|c| c.transaction.description.as_str())
        .collect();
    assert_eq!(names, vec!["VISA GOLD 7890 SETTLEMENT", "HOK 55", "GOLD GYM"]);

    let top = &result.candidates[0];
    assert_eq!(top.reason, MatchReason::AccountNumberMatch);
    assert!(top.matched_patterns.contains(&"7890".to_string()));
    assert_eq!(top.transaction.account_number.as_deref(), Some("123-456"));

    assert_eq!(result.candidates[1].reason, MatchReason::CategoryMatch);

    let gold_only = &result.candidates[2];
    assert_eq!(gold_only.reason, MatchReason::KeywordMatch);
    assert_eq!(gold_only.matched_patterns, vec!["gold"]);
    assert!(top.confidence > gold_only.confidence);

    assert_eq!(result.summary.total_candidates, 3);
    assert_eq!(result.summary.debit_count, 3);
    assert_eq!(result.summary.credit_count, 0);
    assert_eq!(result.summary.account_number_matches, 1);
    assert!(result.suggested_patterns.contains(&"7890".to_string()));
}

#[test]
fn test_find_candidates_without_card_hints() {
    let db = setup_db();
    seed_bank_account(&db);
    let config = PipelineConfig::default();
    let finder = SettlementFinder::new(&db, &config.settlement);

    let search = finder
        .find_settlement_candidates(&SettlementQuery {
            credit_card_vendor: "max".into(),
            bank_vendor: "bankX".into(),
            bank_account_number: Some("123-456".into()),
            card_nickname: Some("Visa Gold".into()),
            ..Default::default()
        })
        .expect("candidate search");

    // Nickname is ignored here: GOLD GYM no longer qualifies
    let names: Vec<&str> = search
        .candidates
        .iter()
        .map(|c| c.transaction.description.as_str())
        .collect();
    assert_eq!(names, vec!["HOK 55", "VISA GOLD 7890 SETTLEMENT"]);
    assert_eq!(search.candidates[1].reason, MatchReason::KeywordMatch);
    assert_eq!(search.summary.category_matches, 1);
    assert_eq!(search.summary.keyword_matches, 1);
}

#[test]
fn test_smart_match_requires_vendors() {
    let db = setup_db();
    let config = PipelineConfig::default();
    let finder = SettlementFinder::new(&db, &config.settlement);
    let result = finder.smart_match(&SettlementQuery {
        credit_card_vendor: " ".into(),
        bank_vendor: "bankX".into(),
        ..Default::default()
    });
    assert!(matches!(result, Err(settle_core::Error::Validation(_))));
}

// =============================================================================
// Discrepancy Analysis
// =============================================================================

#[test]
fn test_discrepancy_analysis() {
    let db = setup_db();
    let pairing = db
        .create_pairing(&NewAccountPairing {
            credit_card_vendor: "max".into(),
            credit_card_account_number: Some("7890".into()),
            bank_vendor: "bankX".into(),
            bank_account_number: Some("123-456".into()),
            match_patterns: vec!["MAX".into()],
        })
        .unwrap();

    // January: exact match
    insert_plain(&db, &bank_row("s1", "MAX PAYMENT", -1000.0, date(2024, 1, 10)));
    insert_plain(&db, &card_row("c1", "SUPERMARKET", -600.0, date(2024, 1, 10)));
    insert_plain(&db, &card_row("c2", "FUEL", -400.0, date(2024, 1, 10)));
    // February: bank paid 100 more than the card charged
    insert_plain(&db, &bank_row("s2", "MAX PAYMENT", -1500.0, date(2024, 2, 10)));
    insert_plain(&db, &card_row("c3", "ELECTRONICS", -1400.0, date(2024, 2, 10)));
    // March: too recent to have card history
    insert_plain(&db, &bank_row("s3", "MAX PAYMENT", -800.0, date(2024, 3, 25)));

    let config = PipelineConfig::default();
    let as_of = date(2024, 4, 1);
    let report = analyze_discrepancy(&db, &config.discrepancy, &pairing, as_of, 6)
        .expect("analysis");

    assert_eq!(report.total_cycles, 3);
    assert_eq!(report.matched_cycles, 1);
    assert_eq!(report.cycles[0].cycle_date, date(2024, 3, 25));
    assert_eq!(report.cycles[0].status, CycleStatus::IncompleteHistory);
    assert_eq!(report.cycles[1].status, CycleStatus::FeeCandidate);
    assert_eq!(report.cycles[1].difference, Some(100.0));
    assert_eq!(report.cycles[2].status, CycleStatus::Matched);

    assert_eq!(report.total_bank, 2500.0);
    assert_eq!(report.total_card, 2400.0);
    assert_eq!(report.difference, 100.0);
    assert_eq!(report.difference_pct, 4.17);
    assert!(report.exists);

    db.acknowledge_discrepancy(pairing.id).unwrap();
    let pairing = db.get_pairing(pairing.id).unwrap().unwrap();
    let report = analyze_discrepancy(&db, &config.discrepancy, &pairing, as_of, 6).unwrap();
    assert!(report.acknowledged);
    assert!(!report.exists);
}
