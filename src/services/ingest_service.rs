//! Ingestion loader
//!
//! Fetches raw rows from a source, validates them row by row, and appends
//! the survivors to the landing store. A source fetch failure is fatal and
//! aborts before anything is written; a bad row is rejected, logged and
//! reported without disturbing the rest of the batch.

use crate::db::landing::{NewCompanyRow, NewPriceRow};
use crate::db::Warehouse;
use crate::error::Result;
use crate::sources::{CompanyRow, CompanySource, PriceRow, PriceSource};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// One rejected row: its position in the source batch plus the reason.
#[derive(Debug, Clone, Serialize)]
pub struct RowRejection {
    pub index: usize,
    pub reason: String,
}

/// Outcome of loading one feed.
#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub source: String,
    pub accepted: usize,
    pub rejections: Vec<RowRejection>,
}

impl LoadResult {
    pub fn rejected(&self) -> usize {
        self.rejections.len()
    }
}

/// Ingestion service for feed loading
pub struct IngestService;

impl IngestService {
    /// Fetch, validate and land one batch of price rows.
    pub async fn ingest_prices(
        warehouse: &Warehouse,
        source: &dyn PriceSource,
    ) -> Result<LoadResult> {
        info!("Ingesting prices from {}", source.describe());

        let raw_rows = source.fetch_prices().await?;
        let batch_start = Utc::now();

        let mut valid = Vec::new();
        let mut rejections = Vec::new();

        for (index, value) in raw_rows.into_iter().enumerate() {
            match validate_price_row(value) {
                Ok(row) => valid.push(row),
                Err(reason) => {
                    warn!("Rejected price row {}: {}", index, reason);
                    rejections.push(RowRejection { index, reason });
                }
            }
        }

        let accepted = warehouse.append_prices(&valid, batch_start)?;

        info!(
            "Price ingestion done: {} accepted, {} rejected",
            accepted,
            rejections.len()
        );

        Ok(LoadResult {
            source: source.describe(),
            accepted,
            rejections,
        })
    }

    /// Fetch, validate and land one batch of company rows.
    pub async fn ingest_companies(
        warehouse: &Warehouse,
        source: &dyn CompanySource,
    ) -> Result<LoadResult> {
        info!("Ingesting companies from {}", source.describe());

        let raw_rows = source.fetch_companies().await?;
        let batch_start = Utc::now();

        let mut valid = Vec::new();
        let mut rejections = Vec::new();

        for (index, value) in raw_rows.into_iter().enumerate() {
            match validate_company_row(value, batch_start) {
                Ok(row) => valid.push(row),
                Err(reason) => {
                    warn!("Rejected company row {}: {}", index, reason);
                    rejections.push(RowRejection { index, reason });
                }
            }
        }

        let accepted = warehouse.append_companies(&valid)?;

        info!(
            "Company ingestion done: {} accepted, {} rejected",
            accepted,
            rejections.len()
        );

        Ok(LoadResult {
            source: source.describe(),
            accepted,
            rejections,
        })
    }
}

fn required_text(field: &str, value: Option<&str>) -> std::result::Result<String, String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("missing {}", field))
}

fn required_price(field: &str, value: Option<f64>) -> std::result::Result<f64, String> {
    let value = value.ok_or_else(|| format!("missing {}", field))?;
    if !value.is_finite() {
        return Err(format!("non-finite {}", field));
    }
    if value < 0.0 {
        return Err(format!("negative {}: {}", field, value));
    }
    Ok(value)
}

/// Validate one wire price row. Ticker is normalized to uppercase so dedup
/// keys and dimension joins are case-insensitive at the feed boundary.
fn validate_price_row(value: Value) -> std::result::Result<NewPriceRow, String> {
    let row: PriceRow =
        serde_json::from_value(value).map_err(|e| format!("malformed row: {}", e))?;

    let ticker = required_text("ticker", row.ticker.as_deref())?.to_uppercase();

    let date_text = required_text("date", row.date.as_deref())?;
    let trade_date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
        .map_err(|_| format!("unparseable date '{}'", date_text))?;

    let open = required_price("open_price", row.open_price)?;
    let high = required_price("high_price", row.high_price)?;
    let low = required_price("low_price", row.low_price)?;
    let close = required_price("close_price", row.close_price)?;

    let volume = match row.volume {
        Some(v) if v >= 0 => v,
        Some(v) => return Err(format!("negative volume: {}", v)),
        None => return Err("missing volume".to_string()),
    };

    Ok(NewPriceRow {
        ticker,
        trade_date,
        open,
        high,
        low,
        close,
        volume,
    })
}

fn parse_feed_timestamp(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("unparseable timestamp '{}'", text))
}

/// Validate one wire company row. Feed timestamps are optional and default
/// to the batch time when omitted.
fn validate_company_row(
    value: Value,
    batch_start: DateTime<Utc>,
) -> std::result::Result<NewCompanyRow, String> {
    let row: CompanyRow =
        serde_json::from_value(value).map_err(|e| format!("malformed row: {}", e))?;

    let ticker = required_text("ticker", row.ticker.as_deref())?.to_uppercase();
    let name = required_text("name", row.name.as_deref())?;

    let sector = row
        .sector
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let created_at = match row.created_at.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => parse_feed_timestamp(text)?,
        None => batch_start,
    };
    let updated_at = match row.updated_at.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => parse_feed_timestamp(text)?,
        None => batch_start,
    };

    Ok(NewCompanyRow {
        ticker,
        name,
        sector,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubPrices(Vec<Value>);

    #[async_trait]
    impl PriceSource for StubPrices {
        fn describe(&self) -> String {
            "stub".to_string()
        }

        async fn fetch_prices(&self) -> Result<Vec<Value>> {
            Ok(self.0.clone())
        }
    }

    struct FailingPrices;

    #[async_trait]
    impl PriceSource for FailingPrices {
        fn describe(&self) -> String {
            "failing stub".to_string()
        }

        async fn fetch_prices(&self) -> Result<Vec<Value>> {
            Err(AppError::Source("connection refused".to_string()))
        }
    }

    fn good_row() -> Value {
        json!({
            "ticker": "aapl",
            "date": "2024-01-02",
            "open_price": 100.0,
            "close_price": 105.0,
            "high_price": 108.0,
            "low_price": 98.0,
            "volume": 50_000_000i64,
        })
    }

    #[test]
    fn test_validate_price_row_normalizes_ticker() {
        let row = validate_price_row(good_row()).unwrap();
        assert_eq!(row.ticker, "AAPL");
        assert_eq!(row.volume, 50_000_000);
    }

    #[test]
    fn test_validate_price_row_rejects_bad_date() {
        let mut value = good_row();
        value["date"] = json!("02/01/2024");
        let reason = validate_price_row(value).unwrap_err();
        assert!(reason.contains("unparseable date"));
    }

    #[test]
    fn test_validate_price_row_rejects_negative_price() {
        let mut value = good_row();
        value["low_price"] = json!(-1.5);
        let reason = validate_price_row(value).unwrap_err();
        assert!(reason.contains("negative low_price"));
    }

    #[test]
    fn test_validate_price_row_allows_zero_open() {
        // Zero open must land; the dedup stage turns its change metric into
        // null rather than rejecting the observation.
        let mut value = good_row();
        value["open_price"] = json!(0.0);
        assert!(validate_price_row(value).is_ok());
    }

    #[test]
    fn test_validate_company_row_defaults_timestamps() {
        let batch = Utc::now();
        let row = validate_company_row(json!({"ticker": "jpm", "name": "JPMorgan Chase"}), batch)
            .unwrap();
        assert_eq!(row.ticker, "JPM");
        assert_eq!(row.updated_at, batch);
    }

    #[test]
    fn test_validate_company_row_accepts_rfc3339() {
        let row = validate_company_row(
            json!({
                "ticker": "JPM",
                "name": "JPMorgan Chase",
                "updated_at": "2024-01-02T09:30:00Z",
            }),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(row.updated_at.to_rfc3339(), "2024-01-02T09:30:00+00:00");
    }

    #[tokio::test]
    async fn test_bad_rows_rejected_good_rows_landed() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let source = StubPrices(vec![
            good_row(),
            json!({"ticker": "JPM", "date": "not-a-date"}),
            json!({"date": "2024-01-02", "open_price": 1.0, "close_price": 1.0,
                   "high_price": 1.0, "low_price": 1.0, "volume": 10i64}),
        ]);

        let result = IngestService::ingest_prices(&warehouse, &source)
            .await
            .unwrap();

        assert_eq!(result.accepted, 1);
        assert_eq!(result.rejected(), 2);
        assert_eq!(result.rejections[0].index, 1);
        assert!(result.rejections[1].reason.contains("missing ticker"));

        let snapshot = warehouse.raw_snapshot().unwrap();
        assert_eq!(snapshot.prices.len(), 1);
        assert_eq!(snapshot.prices[0].ticker, "AAPL");
    }

    #[tokio::test]
    async fn test_source_failure_writes_nothing() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let result = IngestService::ingest_prices(&warehouse, &FailingPrices).await;

        assert!(matches!(result, Err(AppError::Source(_))));
        assert_eq!(warehouse.raw_snapshot().unwrap().prices.len(), 0);
    }
}
