//! Environment-driven configuration
//!
//! All knobs come from the environment (a `.env` file is honored via
//! `dotenvy` in `main`). CLI flags override individual fields where the
//! subcommand exposes them.

use crate::error::{AppError, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Engine used to collapse duplicate (ticker, trade_date) rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupMode {
    /// Group-and-rank runs inside the store via the `clean_prices`
    /// window-function view. Default; scales without loading the raw
    /// table into process memory.
    Pushdown,
    /// Streaming group-by in process memory, partitioned by ticker.
    /// Fallback for stores without window-function support.
    InMemory,
}

impl FromStr for DedupMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pushdown" => Ok(DedupMode::Pushdown),
            "memory" | "in-memory" => Ok(DedupMode::InMemory),
            other => Err(AppError::Config(format!(
                "Invalid PRICEMART_DEDUP value '{}' (expected 'pushdown' or 'memory')",
                other
            ))),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the DuckDB warehouse file.
    pub database_path: PathBuf,

    /// Dedup engine selection.
    pub dedup_mode: DedupMode,

    /// Alpha Vantage API key, required only for `--fetch` ingestion.
    pub alpha_vantage_key: Option<String>,
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let database_path = std::env::var("PRICEMART_DB")
            .unwrap_or_else(|_| "pricemart.duckdb".to_string())
            .into();

        let dedup_mode = match std::env::var("PRICEMART_DEDUP") {
            Ok(value) => value.parse()?,
            Err(_) => DedupMode::Pushdown,
        };

        let alpha_vantage_key = std::env::var("ALPHAVANTAGE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            database_path,
            dedup_mode,
            alpha_vantage_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_mode_parsing() {
        assert_eq!("pushdown".parse::<DedupMode>().unwrap(), DedupMode::Pushdown);
        assert_eq!("memory".parse::<DedupMode>().unwrap(), DedupMode::InMemory);
        assert_eq!("In-Memory".parse::<DedupMode>().unwrap(), DedupMode::InMemory);
        assert!("streaming".parse::<DedupMode>().is_err());
    }
}
