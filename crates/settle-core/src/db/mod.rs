//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `categories` - Category tree definitions and write-time tree checks
//! - `transactions` - Ledger inserts, lookups and classification writes
//! - `rules` - Categorization rule CRUD
//! - `catalog` - Merchant catalog CRUD
//! - `pairings` - Credit card / bank account pairings
//! - `reports` - Aggregates with the settlement exclusion filter
//! - `audit` - Audit log of writes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod audit;
mod catalog;
mod categories;
mod pairings;
mod reports;
mod rules;
mod transactions;

pub use audit::AuditEntry;
pub use transactions::TransactionInsertResult;
pub(crate) use transactions::{load_claimable, write_category_match, ClaimableRow};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "SETTLE_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"settle-salt-v1-x";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a stored "YYYY-MM-DD" date (tolerates a trailing time part)
pub(crate) fn parse_date(s: &str) -> NaiveDate {
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap_or_default()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    /// Bumped on every category definition write; resolvers drop their cache when it moves
    category_generation: Arc<AtomicU64>,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `SETTLE_DB_KEY` environment variable to be set.
    /// Returns an error if it is not set. Use `new_unencrypted()`
    /// for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases.",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            let manager =
                manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
            category_generation: Arc::new(AtomicU64::new(0)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because every pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "settle_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Current category generation
    pub fn category_generation(&self) -> u64 {
        self.category_generation.load(Ordering::SeqCst)
    }

    pub(crate) fn bump_category_generation(&self) {
        self.category_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Run `f` inside one SQLite transaction; commit on `Ok`, roll back on `Err`
    pub(crate) fn with_transaction<T>(&self, f: impl FnOnce(&DbConn) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        conn.execute("BEGIN TRANSACTION", [])?;

        match f(&conn) {
            Ok(value) => {
                conn.execute("COMMIT", [])?;
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block the writer during bulk passes
            PRAGMA journal_mode = WAL;
            PRAGMA cache_size = 2000;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Two-level category tree (parent chain depth <= 2, acyclic)
            CREATE TABLE IF NOT EXISTS category_definitions (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                name_en TEXT,
                parent_id INTEGER REFERENCES category_definitions(id),
                category_type TEXT NOT NULL DEFAULT 'expense',  -- expense, income, investment
                is_active INTEGER NOT NULL DEFAULT 1,
                display_order INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_categories_parent ON category_definitions(parent_id);
            CREATE INDEX IF NOT EXISTS idx_categories_name ON category_definitions(name);

            -- User-authored categorization rules
            CREATE TABLE IF NOT EXISTS categorization_rules (
                id INTEGER PRIMARY KEY,
                name_pattern TEXT NOT NULL,
                target_category TEXT,
                category_definition_id INTEGER REFERENCES category_definitions(id),
                priority INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_rules_priority ON categorization_rules(priority DESC);

            -- Ledger, one row per (external_id, vendor)
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                external_id TEXT NOT NULL,
                vendor TEXT NOT NULL,
                date TEXT NOT NULL,
                processed_date TEXT,
                description TEXT NOT NULL,
                amount REAL NOT NULL,
                raw_category TEXT,
                category_definition_id INTEGER REFERENCES category_definitions(id),
                category TEXT,
                category_type TEXT,
                merchant_name TEXT,
                auto_categorized INTEGER NOT NULL DEFAULT 0,
                confidence_score REAL NOT NULL DEFAULT 0,
                category_source TEXT,                      -- rule, catalog, name, manual
                matched_rule_id INTEGER REFERENCES categorization_rules(id) ON DELETE SET NULL,
                manual_override INTEGER NOT NULL DEFAULT 0,
                account_number TEXT,
                status TEXT NOT NULL DEFAULT 'completed',  -- completed, pending
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(external_id, vendor)
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
            CREATE INDEX IF NOT EXISTS idx_transactions_vendor ON transactions(vendor, account_number);
            CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category_definition_id);

            -- Curated merchant-name fragments
            CREATE TABLE IF NOT EXISTS merchant_catalog (
                id INTEGER PRIMARY KEY,
                merchant_pattern TEXT NOT NULL,
                parent_category TEXT NOT NULL,
                subcategory TEXT,
                confidence REAL NOT NULL CHECK(confidence >= 0 AND confidence <= 1),
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Credit card account <-> settling bank account
            CREATE TABLE IF NOT EXISTS account_pairings (
                id INTEGER PRIMARY KEY,
                credit_card_vendor TEXT NOT NULL,
                credit_card_account_number TEXT,
                bank_vendor TEXT NOT NULL,
                bank_account_number TEXT,
                match_patterns TEXT NOT NULL,              -- JSON array, never empty
                is_active INTEGER NOT NULL DEFAULT 1,
                discrepancy_acknowledged INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_pairings_bank ON account_pairings(bank_vendor, is_active);

            -- Audit log of writes
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
