//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Settle - Normalize bank and credit card ledgers
#[derive(Parser)]
#[command(name = "settle")]
#[command(about = "Transaction categorization and card settlement matching", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "settle.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SETTLE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Pipeline config file (defaults to the data dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed default categories
    Init,

    /// Ingest raw transactions from CSV, categorizing them on the way in
    Ingest {
        /// CSV file with external_id,vendor,date,description,amount,... headers
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Categorize one transaction name
    Categorize {
        /// Transaction name / description
        name: String,

        /// External id of the transaction to commit the match to
        #[arg(long, requires = "vendor")]
        external_id: Option<String>,

        /// Vendor of the transaction to commit the match to
        #[arg(long, requires = "external_id")]
        vendor: Option<String>,

        /// Category text supplied by the source
        #[arg(long)]
        raw_category: Option<String>,
    },

    /// Manage the category tree
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Manage categorization rules
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Re-run every active rule over the ledger
    ApplyRules,

    /// Manage the merchant catalog
    Catalog {
        #[command(subcommand)]
        action: Option<CatalogAction>,
    },

    /// Browse transactions and set manual categories
    Transactions {
        #[command(subcommand)]
        action: Option<TransactionsAction>,
    },

    /// Manage credit card / bank account pairings
    Pairings {
        #[command(subcommand)]
        action: Option<PairingsAction>,
    },

    /// Generate reports
    Report {
        #[command(subcommand)]
        report_type: ReportType,
    },

    /// Show the audit log
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// Show the category tree
    List,

    /// Add a category
    Add {
        /// Category name
        name: String,
        /// Parent category ID (omit for a root)
        #[arg(long)]
        parent: Option<i64>,
        /// Category type: expense, income, investment
        #[arg(long = "type", default_value = "expense")]
        category_type: String,
        /// Localized display name
        #[arg(long)]
        name_en: Option<String>,
        /// Display order among siblings
        #[arg(long, default_value = "0")]
        order: i32,
    },

    /// Rename, move or deactivate a category
    Update {
        /// Category ID
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New parent category ID
        #[arg(long, conflicts_with = "root")]
        parent: Option<i64>,
        /// Make the category a root
        #[arg(long)]
        root: bool,
        /// Deactivate the category
        #[arg(long, conflicts_with = "activate")]
        deactivate: bool,
        /// Reactivate the category
        #[arg(long)]
        activate: bool,
    },

    /// List a category and all its descendants
    Descendants {
        /// Category ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List rules in match order
    List {
        /// Include inactive rules
        #[arg(long)]
        all: bool,
    },

    /// Add a new rule
    Add {
        /// Substring to match against transaction names (case-insensitive)
        pattern: String,
        /// Target category name (free text, resolved by name)
        #[arg(long, required_unless_present = "category_id")]
        category: Option<String>,
        /// Target category ID
        #[arg(long)]
        category_id: Option<i64>,
        /// Rule priority (higher = checked first)
        #[arg(long, default_value = "0")]
        priority: i32,
    },

    /// Update a rule
    Update {
        /// Rule ID
        id: i64,
        /// New pattern
        #[arg(long)]
        pattern: Option<String>,
        /// New target category name
        #[arg(long)]
        category: Option<String>,
        /// New target category ID
        #[arg(long)]
        category_id: Option<i64>,
        /// New priority
        #[arg(long)]
        priority: Option<i32>,
        /// Disable the rule
        #[arg(long, conflicts_with = "enable")]
        disable: bool,
        /// Enable the rule
        #[arg(long)]
        enable: bool,
    },

    /// Delete a rule
    Delete {
        /// Rule ID to delete
        id: i64,
    },

    /// Test which rules match a name
    Test {
        /// Name to test
        name: String,
    },
}

#[derive(Subcommand)]
pub enum CatalogAction {
    /// List catalog entries
    List {
        /// Include disabled entries
        #[arg(long)]
        all: bool,
    },

    /// Add a catalog entry
    Add {
        /// Merchant name fragment
        pattern: String,
        /// Parent category name
        parent: String,
        /// Subcategory name
        #[arg(long)]
        subcategory: Option<String>,
        /// Catalog confidence in [0, 1]
        #[arg(long, default_value = "0.9")]
        confidence: f64,
    },

    /// Enable a catalog entry
    Enable {
        /// Entry ID
        id: i64,
    },

    /// Disable a catalog entry
    Disable {
        /// Entry ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum TransactionsAction {
    /// List recent transactions
    List {
        /// Number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Set a manual category (never overwritten by automatic passes)
    SetCategory {
        /// Transaction ID
        id: i64,
        /// Category ID
        category_id: i64,
    },
}

#[derive(Subcommand)]
pub enum PairingsAction {
    /// List pairings
    List {
        /// Include inactive pairings
        #[arg(long)]
        all: bool,
    },

    /// Pair a credit card account with the bank account that settles it
    Add {
        /// Credit card vendor
        cc_vendor: String,
        /// Bank vendor
        bank_vendor: String,
        /// Credit card account number
        #[arg(long)]
        cc_account: Option<String>,
        /// Bank account number
        #[arg(long)]
        bank_account: Option<String>,
        /// Match pattern (repeatable, at least one)
        #[arg(long = "pattern", required = true)]
        patterns: Vec<String>,
    },

    /// Update a pairing
    Update {
        /// Pairing ID
        id: i64,
        /// Replace the match patterns (repeatable)
        #[arg(long = "pattern")]
        patterns: Vec<String>,
        /// New credit card account number
        #[arg(long)]
        cc_account: Option<String>,
        /// New bank account number
        #[arg(long)]
        bank_account: Option<String>,
    },

    /// Deactivate a pairing
    Remove {
        /// Pairing ID
        id: i64,
    },

    /// Find bank transactions that look like settlements of a card
    Candidates {
        #[command(flatten)]
        accounts: PairingAccounts,
    },

    /// Find settlements using the card nickname and last digits too
    SmartMatch {
        #[command(flatten)]
        accounts: PairingAccounts,
        /// Card nickname, e.g. "Visa Gold"
        #[arg(long)]
        nickname: Option<String>,
        /// Last digits of the card number
        #[arg(long)]
        last4: Option<String>,
    },

    /// Guess which bank account pays a card's bills
    SuggestBank {
        /// Credit card vendor
        cc_vendor: String,
        /// Credit card account number
        #[arg(long)]
        cc_account: Option<String>,
        /// Restrict to one bank vendor
        #[arg(long)]
        bank_vendor: Option<String>,
        /// Restrict to one bank account
        #[arg(long)]
        bank_account: Option<String>,
    },

    /// Compare a pairing's settlements with the card charges they pay
    Discrepancy {
        /// Pairing ID
        id: i64,
        /// Months of history to compare
        #[arg(long)]
        months: Option<u32>,
        /// End of the window (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Acknowledge a pairing's discrepancy
    Acknowledge {
        /// Pairing ID
        id: i64,
    },
}

#[derive(clap::Args)]
pub struct PairingAccounts {
    /// Credit card vendor
    pub cc_vendor: String,
    /// Bank vendor
    pub bank_vendor: String,
    /// Credit card account number
    #[arg(long)]
    pub cc_account: Option<String>,
    /// Bank account number
    #[arg(long)]
    pub bank_account: Option<String>,
}

#[derive(Subcommand)]
pub enum ReportType {
    /// Expenses for one month, settlements excluded
    Monthly {
        /// Month (YYYY-MM)
        period: String,
    },

    /// Spending by category
    Categories {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: String,
    },

    /// Spending for one category
    Category {
        /// Category ID
        id: i64,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: String,
        /// Count only the category itself
        #[arg(long)]
        no_subcategories: bool,
    },
}

impl PairingAccounts {
    /// Build a candidate search, optionally with card hints
    pub fn into_query(
        self,
        nickname: Option<String>,
        last4: Option<String>,
    ) -> settle_core::SettlementQuery {
        settle_core::SettlementQuery {
            credit_card_vendor: self.cc_vendor,
            credit_card_account_number: self.cc_account,
            bank_vendor: self.bank_vendor,
            bank_account_number: self.bank_account,
            card_nickname: nickname,
            card_last4: last4,
        }
    }
}
