//! Settle CLI - Transaction normalization pipeline
//!
//! Usage:
//!   settle init                    Initialize database
//!   settle ingest --file rows.csv  Ingest and categorize raw transactions
//!   settle apply-rules             Re-run categorization rules
//!   settle serve --port 3000       Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Ingest { file } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_ingest(&db, &file)
        }
        Commands::Categorize {
            name,
            external_id,
            vendor,
            raw_category,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_categorize(
                &db,
                &name,
                external_id.as_deref(),
                vendor.as_deref(),
                raw_category.as_deref(),
            )
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db),
                Some(CategoriesAction::Add {
                    name,
                    parent,
                    category_type,
                    name_en,
                    order,
                }) => commands::cmd_categories_add(
                    &db,
                    &name,
                    parent,
                    &category_type,
                    name_en.as_deref(),
                    order,
                ),
                Some(CategoriesAction::Update {
                    id,
                    name,
                    parent,
                    root,
                    deactivate,
                    activate,
                }) => {
                    let parent = match (parent, root) {
                        (_, true) => Some(None),
                        (Some(p), false) => Some(Some(p)),
                        (None, false) => None,
                    };
                    let active = match (deactivate, activate) {
                        (true, _) => Some(false),
                        (_, true) => Some(true),
                        _ => None,
                    };
                    commands::cmd_categories_update(&db, id, name, parent, active)
                }
                Some(CategoriesAction::Descendants { id }) => {
                    commands::cmd_categories_descendants(&db, id)
                }
            }
        }
        Commands::Rules { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_rules_list(&db, false),
                Some(RulesAction::List { all }) => commands::cmd_rules_list(&db, all),
                Some(RulesAction::Add {
                    pattern,
                    category,
                    category_id,
                    priority,
                }) => commands::cmd_rules_add(&db, &pattern, category, category_id, priority),
                Some(RulesAction::Update {
                    id,
                    pattern,
                    category,
                    category_id,
                    priority,
                    disable,
                    enable,
                }) => {
                    let active = match (disable, enable) {
                        (true, _) => Some(false),
                        (_, true) => Some(true),
                        _ => None,
                    };
                    commands::cmd_rules_update(
                        &db,
                        id,
                        commands::RuleChanges {
                            pattern,
                            category,
                            category_id,
                            priority,
                            active,
                        },
                    )
                }
                Some(RulesAction::Delete { id }) => commands::cmd_rules_delete(&db, id),
                Some(RulesAction::Test { name }) => commands::cmd_rules_test(&db, &name),
            }
        }
        Commands::ApplyRules => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_apply_rules(&db)
        }
        Commands::Catalog { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_catalog_list(&db, false),
                Some(CatalogAction::List { all }) => commands::cmd_catalog_list(&db, all),
                Some(CatalogAction::Add {
                    pattern,
                    parent,
                    subcategory,
                    confidence,
                }) => commands::cmd_catalog_add(
                    &db,
                    &pattern,
                    &parent,
                    subcategory.as_deref(),
                    confidence,
                ),
                Some(CatalogAction::Enable { id }) => commands::cmd_catalog_set_active(&db, id, true),
                Some(CatalogAction::Disable { id }) => {
                    commands::cmd_catalog_set_active(&db, id, false)
                }
            }
        }
        Commands::Transactions { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_transactions_list(&db, 20),
                Some(TransactionsAction::List { limit }) => {
                    commands::cmd_transactions_list(&db, limit)
                }
                Some(TransactionsAction::SetCategory { id, category_id }) => {
                    commands::cmd_transactions_set_category(&db, id, category_id)
                }
            }
        }
        Commands::Pairings { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(cli.config.as_deref())?;
            match action {
                None => commands::cmd_pairings_list(&db, false),
                Some(PairingsAction::List { all }) => commands::cmd_pairings_list(&db, all),
                Some(PairingsAction::Add {
                    cc_vendor,
                    bank_vendor,
                    cc_account,
                    bank_account,
                    patterns,
                }) => commands::cmd_pairings_add(
                    &db,
                    &cc_vendor,
                    &bank_vendor,
                    cc_account,
                    bank_account,
                    patterns,
                ),
                Some(PairingsAction::Update {
                    id,
                    patterns,
                    cc_account,
                    bank_account,
                }) => commands::cmd_pairings_update(&db, id, patterns, cc_account, bank_account),
                Some(PairingsAction::Remove { id }) => commands::cmd_pairings_remove(&db, id),
                Some(PairingsAction::Candidates { accounts }) => {
                    commands::cmd_pairings_candidates(&db, &config, accounts.into_query(None, None))
                }
                Some(PairingsAction::SmartMatch {
                    accounts,
                    nickname,
                    last4,
                }) => commands::cmd_pairings_smart_match(
                    &db,
                    &config,
                    accounts.into_query(nickname, last4),
                ),
                Some(PairingsAction::SuggestBank {
                    cc_vendor,
                    cc_account,
                    bank_vendor,
                    bank_account,
                }) => commands::cmd_pairings_suggest_bank(
                    &db,
                    &config,
                    &cc_vendor,
                    cc_account.as_deref(),
                    bank_vendor.as_deref(),
                    bank_account.as_deref(),
                ),
                Some(PairingsAction::Discrepancy { id, months, as_of }) => {
                    let as_of = commands::parse_date_arg(as_of.as_deref())?;
                    commands::cmd_pairings_discrepancy(&db, &config, id, months, as_of)
                }
                Some(PairingsAction::Acknowledge { id }) => {
                    commands::cmd_pairings_acknowledge(&db, id)
                }
            }
        }
        Commands::Report { report_type } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match report_type {
                ReportType::Monthly { period } => commands::cmd_report_monthly(&db, &period),
                ReportType::Categories { from, to } => {
                    let from = commands::parse_date_arg(Some(&from))?;
                    let to = commands::parse_date_arg(Some(&to))?;
                    commands::cmd_report_categories(&db, from, to)
                }
                ReportType::Category {
                    id,
                    from,
                    to,
                    no_subcategories,
                } => {
                    let from = commands::parse_date_arg(Some(&from))?;
                    let to = commands::parse_date_arg(Some(&to))?;
                    commands::cmd_report_category(&db, id, from, to, !no_subcategories)
                }
            }
        }
        Commands::Audit { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_audit(&db, limit)
        }
        Commands::Serve { port, host } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_serve(&cli.db, &host, port, cli.no_encrypt, config).await
        }
    }
}
