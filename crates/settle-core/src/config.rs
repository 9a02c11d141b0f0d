//! Pipeline configuration
//!
//! Tunables for settlement matching and discrepancy analysis.
//!
//! ## Configuration Resolution
//!
//! 1. Explicit path (`--config`), when given and present
//! 2. Override in data dir (~/.local/share/settle/config/pipeline.toml)
//! 3. Embedded defaults (compiled into binary)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/pipeline.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub settlement: SettlementConfig,
    pub discrepancy: DiscrepancyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Most recent bank transactions scanned per candidate search
    pub scan_limit: i64,
    /// Smallest debit magnitude treated as a periodic card payment
    pub min_settlement_amount: f64,
    /// Generic settlement phrasing (case-insensitive)
    pub generic_phrases: Vec<String>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            scan_limit: 500,
            min_settlement_amount: 100.0,
            generic_phrases: vec![
                "credit card".to_string(),
                "card payment".to_string(),
                "settlement".to_string(),
                "repayment".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscrepancyConfig {
    pub epsilon: f64,
    pub max_fee_amount: f64,
    pub early_grace_days: i64,
    pub recent_grace_days: i64,
    pub months_back: u32,
}

impl Default for DiscrepancyConfig {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            max_fee_amount: 200.0,
            early_grace_days: 14,
            recent_grace_days: 14,
            months_back: 6,
        }
    }
}

/// Default override location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("settle").join("config").join("pipeline.toml"))
}

impl PipelineConfig {
    /// Load configuration, preferring `override_path`, then the data dir, then defaults
    ///
    /// An explicit path must exist; the data-dir file is optional.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let path = match override_path {
            Some(path) if !path.exists() => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                debug!("Loading pipeline config from {}", path.display());
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)
            }
            None => Self::from_toml(DEFAULT_CONFIG),
        }
    }

    /// Parse configuration text; absent keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.settlement.scan_limit <= 0 {
            return Err(Error::Config("settlement.scan_limit must be positive".into()));
        }
        if self.discrepancy.epsilon < 0.0 || self.discrepancy.max_fee_amount < 0.0 {
            return Err(Error::Config(
                "discrepancy thresholds must not be negative".into(),
            ));
        }
        if self.discrepancy.max_fee_amount < self.discrepancy.epsilon {
            return Err(Error::Config(
                "discrepancy.max_fee_amount must be at least epsilon".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_parse() {
        let config = PipelineConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.settlement.scan_limit, 500);
        assert_eq!(config.discrepancy.epsilon, 1.0);
        assert_eq!(config.discrepancy.max_fee_amount, 200.0);
        assert_eq!(config.discrepancy.early_grace_days, 14);
        assert!(config
            .settlement
            .generic_phrases
            .iter()
            .any(|p| p == "settlement"));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [settlement]
            min_settlement_amount = 50.0
            "#,
        )
        .unwrap();
        assert_eq!(config.settlement.min_settlement_amount, 50.0);
        assert_eq!(config.settlement.scan_limit, 500);
        assert_eq!(config.discrepancy.months_back, 6);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let result = PipelineConfig::from_toml(
            r#"
            [discrepancy]
            epsilon = 5.0
            max_fee_amount = 1.0
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PipelineConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[settlement]\nscan_limit = 42\n").unwrap();
        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.settlement.scan_limit, 42);
    }
}
