//! External data source adapters
//!
//! Sources hand rows to the ingestion loader as raw JSON values; each row is
//! deserialized and validated individually downstream so one bad row cannot
//! take out a batch. Field names follow the upstream feed contract:
//! prices carry (ticker, date, open_price, close_price, high_price,
//! low_price, volume), companies carry (ticker, name, sector, created_at,
//! updated_at).

pub mod alpha_vantage;
pub mod files;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

/// A feed of raw daily price rows.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Human-readable source label for logs and reports.
    fn describe(&self) -> String;

    /// Fetch one batch of raw rows. A fetch failure is fatal for the run;
    /// nothing is written when this errors.
    async fn fetch_prices(&self) -> Result<Vec<Value>>;
}

/// A feed of raw company metadata rows.
#[async_trait]
pub trait CompanySource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch_companies(&self) -> Result<Vec<Value>>;
}

// ============================================================================
// Flexible Deserialization Helpers
// ============================================================================

/// Deserialize an optional value that could be either a string or an integer
fn deserialize_optional_string_or_int<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        String(String),
        Int(i64),
        Null,
    }

    match Option::<StringOrInt>::deserialize(deserializer)? {
        Some(StringOrInt::String(s)) if s.is_empty() => Ok(None),
        Some(StringOrInt::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(StringOrInt::Int(i)) => Ok(Some(i)),
        Some(StringOrInt::Null) | None => Ok(None),
    }
}

/// Deserialize an optional value that could be either a string or a float
fn deserialize_optional_string_or_float<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        String(String),
        Float(f64),
        Int(i64),
        Null,
    }

    match Option::<StringOrFloat>::deserialize(deserializer)? {
        Some(StringOrFloat::String(s)) if s.is_empty() => Ok(None),
        Some(StringOrFloat::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::Int(i)) => Ok(Some(i as f64)),
        Some(StringOrFloat::Null) | None => Ok(None),
    }
}

// ============================================================================
// Wire Row Types
// ============================================================================

/// One raw price row as the feed delivers it, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PriceRow {
    pub ticker: Option<String>,
    pub date: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string_or_float")]
    pub open_price: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_string_or_float")]
    pub close_price: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_string_or_float")]
    pub high_price: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_string_or_float")]
    pub low_price: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_string_or_int")]
    pub volume: Option<i64>,
}

/// One raw company row as the feed delivers it, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompanyRow {
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

// ============================================================================
// Builtin Company Universe
// ============================================================================

/// One tracked company.
#[derive(Debug, Clone, Copy)]
pub struct UniverseCompany {
    pub ticker: &'static str,
    pub name: &'static str,
    pub sector: &'static str,
}

/// Default tracked universe.
pub const DEFAULT_UNIVERSE: &[UniverseCompany] = &[
    UniverseCompany {
        ticker: "AAPL",
        name: "Apple Inc.",
        sector: "Technology",
    },
    UniverseCompany {
        ticker: "JPM",
        name: "JPMorgan Chase",
        sector: "Finance",
    },
    UniverseCompany {
        ticker: "JNJ",
        name: "Johnson & Johnson",
        sector: "Healthcare",
    },
    UniverseCompany {
        ticker: "PG",
        name: "Procter & Gamble",
        sector: "Consumer",
    },
    UniverseCompany {
        ticker: "XOM",
        name: "Exxon Mobil",
        sector: "Energy",
    },
];

/// Company source backed by the builtin universe.
///
/// Timestamps are omitted on purpose; the loader stamps them with the batch
/// time on ingestion.
pub struct UniverseCompanySource;

#[async_trait]
impl CompanySource for UniverseCompanySource {
    fn describe(&self) -> String {
        format!("builtin universe ({} companies)", DEFAULT_UNIVERSE.len())
    }

    async fn fetch_companies(&self) -> Result<Vec<Value>> {
        Ok(DEFAULT_UNIVERSE
            .iter()
            .map(|c| {
                json!({
                    "ticker": c.ticker,
                    "name": c.name,
                    "sector": c.sector,
                })
            })
            .collect())
    }
}
