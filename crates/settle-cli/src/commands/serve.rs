//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use settle_core::PipelineConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_encrypt: bool,
    pipeline: PipelineConfig,
) -> Result<()> {
    println!("🚀 Starting settle web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    // Comma-separated list of allowed CORS origins
    let allowed_origins: Vec<String> = std::env::var("SETTLE_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if !allowed_origins.is_empty() {
        println!(
            "   🌐 CORS origins: {} (SETTLE_ALLOWED_ORIGINS)",
            allowed_origins.join(", ")
        );
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    // Ensure default categories are seeded (idempotent)
    db.seed_default_categories()
        .context("Failed to seed default categories")?;

    let config = settle_server::ServerConfig {
        allowed_origins,
        pipeline,
    };

    settle_server::serve_with_config(db, host, port, config).await?;

    Ok(())
}
