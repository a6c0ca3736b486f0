//! Alpha Vantage price source
//!
//! Pulls TIME_SERIES_DAILY per universe ticker and maps the observations to
//! the loader's wire field names. Numeric fields stay as the API's strings;
//! the loader's lenient wire parsing handles them.

use crate::error::{AppError, Result};
use crate::sources::PriceSource;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Most recent observations kept per ticker (compact output window).
const MAX_DAYS_PER_TICKER: usize = 30;

/// Alpha Vantage TIME_SERIES_DAILY adapter
pub struct AlphaVantageSource {
    client: Client,
    base_url: String,
    api_key: String,
    tickers: Vec<String>,
}

impl AlphaVantageSource {
    pub fn new(api_key: String, tickers: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: BASE_URL.to_string(),
            api_key,
            tickers,
        }
    }

    /// Point the adapter at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn fetch_ticker(&self, ticker: &str) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(self.base_url.as_str())
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", ticker),
                ("apikey", self.api_key.as_str()),
                ("outputsize", "compact"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Source(format!(
                "Alpha Vantage returned HTTP {} for {}",
                response.status(),
                ticker
            )));
        }

        let body: Value = response.json().await?;

        let series = match body.get("Time Series (Daily)").and_then(Value::as_object) {
            Some(series) => series,
            None => {
                // Rate-limit notes and unknown symbols both land here.
                let note = body
                    .get("Note")
                    .or_else(|| body.get("Information"))
                    .and_then(Value::as_str)
                    .unwrap_or("no daily series in response");
                warn!("No data for {}: {}", ticker, note);
                return Ok(Vec::new());
            }
        };

        // serde_json object keys sort ascending by date; the newest
        // observations are at the tail.
        let rows: Vec<Value> = series
            .iter()
            .rev()
            .take(MAX_DAYS_PER_TICKER)
            .map(|(date, prices)| {
                json!({
                    "ticker": ticker,
                    "date": date,
                    "open_price": prices.get("1. open").cloned().unwrap_or(Value::Null),
                    "high_price": prices.get("2. high").cloned().unwrap_or(Value::Null),
                    "low_price": prices.get("3. low").cloned().unwrap_or(Value::Null),
                    "close_price": prices.get("4. close").cloned().unwrap_or(Value::Null),
                    "volume": prices.get("5. volume").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();

        info!("Fetched {} observations for {}", rows.len(), ticker);
        Ok(rows)
    }
}

#[async_trait]
impl PriceSource for AlphaVantageSource {
    fn describe(&self) -> String {
        format!("alpha-vantage ({} tickers)", self.tickers.len())
    }

    async fn fetch_prices(&self) -> Result<Vec<Value>> {
        let mut rows = Vec::new();
        let mut failures = 0usize;

        for ticker in &self.tickers {
            match self.fetch_ticker(ticker).await {
                Ok(ticker_rows) => rows.extend(ticker_rows),
                Err(e) => {
                    // One ticker failing must not sink the batch; the run is
                    // only aborted when nothing could be fetched at all.
                    warn!("Failed to fetch {}: {}", ticker, e);
                    failures += 1;
                }
            }
        }

        if rows.is_empty() && failures > 0 {
            return Err(AppError::Source(format!(
                "Alpha Vantage fetch failed for all {} tickers",
                failures
            )));
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_names_ticker_count() {
        let source = AlphaVantageSource::new(
            "demo".to_string(),
            vec!["AAPL".to_string(), "JPM".to_string()],
        );
        assert_eq!(source.describe(), "alpha-vantage (2 tickers)");
    }
}
