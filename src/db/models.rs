//! Warehouse row models
//!
//! Raw records mirror the landing tables exactly; clean/dimension/fact
//! structs mirror the derived marts. Dates and timestamps cross the DuckDB
//! boundary as strings in a fixed format, so the helpers here are the only
//! place that format is spelled out.

use crate::error::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const TIMESTAMP_WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_READ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a timestamp for a DuckDB TIMESTAMP column.
pub fn fmt_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_WRITE_FORMAT).to_string()
}

/// Parse a timestamp read back from DuckDB (`CAST(x AS VARCHAR)`).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_READ_FORMAT)?;
    Ok(naive.and_utc())
}

/// Format a date for a DuckDB DATE column.
pub fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Parse a date read back from DuckDB.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, DATE_FORMAT)?)
}

/// One append-only landing row for a daily price observation.
///
/// Multiple rows may share (ticker, trade_date); re-ingestions and
/// corrections are appended, never updated in place. `ingest_seq` is the
/// table's insertion order and the deterministic tie-break when two rows
/// carry an identical `ingested_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPriceRecord {
    pub ingest_seq: i64,
    pub ticker: String,
    pub trade_date: Option<NaiveDate>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub ingested_at: DateTime<Utc>,
}

/// One append-only landing row for company metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCompanyRecord {
    pub ingest_seq: i64,
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A deduplicated daily price observation with derived metrics.
///
/// Exactly one row exists per (ticker, trade_date): the landing row with the
/// maximum (ingested_at, ingest_seq) among all rows sharing that key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanPriceRecord {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub ingested_at: DateTime<Utc>,
    /// None when open is zero (division-by-zero policy).
    pub daily_change_pct: Option<f64>,
    pub daily_range: f64,
}

/// One company dimension row with its per-build surrogate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyDimension {
    pub company_id: i64,
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
}

/// One denormalized fact row joining a clean price to the company dimension.
///
/// `company_id` is None for orphan prices with no dimension match; `ticker`
/// is carried alongside so orphans stay attributable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFact {
    pub company_id: Option<i64>,
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub daily_change_pct: Option<f64>,
    pub daily_range: f64,
    pub load_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        let parsed = parse_timestamp(&fmt_timestamp(ts)).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_timestamp_parse_without_fraction() {
        // DuckDB omits the fractional part when it is zero.
        let parsed = parse_timestamp("2024-01-02 09:30:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_date_round_trip() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(parse_date(&fmt_date(d)).unwrap(), d);
    }
}
