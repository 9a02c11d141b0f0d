//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init, ingest, categorize, and shared utilities (open_db, load_config)
//! - `categories` - Category tree commands
//! - `rules` - Rule management and the bulk rule pass
//! - `catalog` - Merchant catalog commands
//! - `transactions` - Transaction listing and manual categories
//! - `pairings` - Pairings, settlement candidates, and discrepancy analysis
//! - `reports` - Report generation commands
//! - `audit` - Audit log listing
//! - `serve` - Web server command

pub mod audit;
pub mod catalog;
pub mod categories;
pub mod core;
pub mod pairings;
pub mod reports;
pub mod rules;
pub mod serve;
pub mod transactions;

// Re-export command functions for main.rs
pub use audit::*;
pub use catalog::*;
pub use categories::*;
pub use core::*;
pub use pairings::*;
pub use reports::*;
pub use rules::*;
pub use serve::*;
pub use transactions::*;

/// Actor recorded in the audit log for CLI writes
pub const CLI_ACTOR: &str = "cli";

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format an amount with color: red for debits, green for credits
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("\x1b[31m{:.2}\x1b[0m", amount.abs())
    } else {
        format!("\x1b[32m+{:.2}\x1b[0m", amount)
    }
}
