//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Pipeline tunables
//! - `cmd_init` - Initialize the database
//! - `cmd_ingest` - Ingest raw rows from CSV
//! - `cmd_categorize` - Categorize one name

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use settle_core::db::Database;
use settle_core::{read_raw_csv, CategorizeRequest, Categorizer, PipelineConfig};

use super::CLI_ACTOR;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load pipeline tunables from --config, the data dir override, or defaults
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    PipelineConfig::load(path).context("Failed to load pipeline config")
}

/// Parse a YYYY-MM-DD argument, defaulting to today
pub fn parse_date_arg(value: Option<&str>) -> Result<NaiveDate> {
    match value {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s)),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    db.seed_default_categories()
        .context("Failed to seed default categories")?;
    println!("   Seeded default categories");

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add rules: settle rules add \"Cafe\" --category Dining");
    println!("  2. Ingest transactions: settle ingest --file rows.csv");
    println!("  3. Start web UI: settle serve");

    Ok(())
}

pub fn cmd_ingest(db: &Database, file: &Path) -> Result<()> {
    println!("📥 Ingesting {}...", file.display());

    let reader =
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let rows = read_raw_csv(reader).context("Failed to parse CSV")?;
    println!("   Read {} rows", rows.len());

    let categorizer = Categorizer::new(db)?;
    let stats = categorizer.ingest_batch(&rows)?;

    db.log_audit(
        CLI_ACTOR,
        "ingest",
        Some("transaction"),
        None,
        Some(&format!(
            "{}: {} inserted, {} duplicates",
            file.display(),
            stats.inserted,
            stats.duplicates
        )),
    )?;

    println!();
    println!("✅ Ingest complete");
    println!("   Inserted:      {}", stats.inserted);
    println!("   Duplicates:    {}", stats.duplicates);
    println!("   Categorized:   {}", stats.categorized);
    println!("   Uncategorized: {}", stats.uncategorized);

    Ok(())
}

pub fn cmd_categorize(
    db: &Database,
    name: &str,
    external_id: Option<&str>,
    vendor: Option<&str>,
    raw_category: Option<&str>,
) -> Result<()> {
    let categorizer = Categorizer::new(db)?;
    let result = categorizer.categorize_one(&CategorizeRequest {
        name: name.to_string(),
        external_id: external_id.map(String::from),
        vendor: vendor.map(String::from),
        raw_category: raw_category.map(String::from),
    })?;

    println!();
    match &result.best {
        Some(m) => println!(
            "🏷️  {} → {} ({}, confidence {:.2})",
            name, m.category, m.source, m.confidence
        ),
        None => println!("❓ {} → uncategorized", name),
    }

    if !result.alternatives.is_empty() {
        println!("   Alternatives:");
        for alt in &result.alternatives {
            println!(
                "     • {} ({}, confidence {:.2})",
                alt.category, alt.source, alt.confidence
            );
        }
    }

    if let Some(id) = result.transaction_id {
        if result.committed {
            db.log_audit(CLI_ACTOR, "categorize", Some("transaction"), Some(id), Some(name))?;
            println!("✅ Committed to transaction {}", id);
        } else {
            println!("   Transaction {} kept its current category", id);
        }
    }

    Ok(())
}
