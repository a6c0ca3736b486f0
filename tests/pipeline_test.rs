//! End-to-end pipeline tests over a real warehouse file

use chrono::NaiveDate;
use pricemart::config::DedupMode;
use pricemart::db::Warehouse;
use pricemart::services::ingest_service::IngestService;
use pricemart::services::pipeline_service::PipelineService;
use pricemart::sources::files::{JsonCompanyFile, JsonPriceFile};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

fn write_json(dir: &Path, name: &str, value: Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    path
}

fn price(ticker: &str, date: &str, open: f64, close: f64, high: f64, low: f64) -> Value {
    json!({
        "ticker": ticker,
        "date": date,
        "open_price": open,
        "close_price": close,
        "high_price": high,
        "low_price": low,
        "volume": 50_000_000i64,
    })
}

/// Land two price batches (the second corrects AAPL 2024-01-02) plus a
/// company feed with a duplicated ticker and one invalid row.
async fn seed(warehouse: &Warehouse, dir: &Path) {
    let first = write_json(
        dir,
        "prices_day1.json",
        json!({
            "prices": [
                price("AAPL", "2024-01-02", 100.0, 110.0, 112.0, 99.0),
                price("JPM", "2024-01-02", 200.0, 201.0, 202.0, 199.5),
                price("ZZZZ", "2024-01-02", 10.0, 11.0, 11.5, 9.5),
            ]
        }),
    );
    let second = write_json(
        dir,
        "prices_day1_correction.json",
        json!({
            "prices": [
                price("AAPL", "2024-01-02", 100.0, 105.0, 108.0, 98.0),
            ]
        }),
    );
    let companies = write_json(
        dir,
        "companies.json",
        json!({
            "companies": [
                {"ticker": "MSFT", "name": "Microsoft", "sector": "Technology"},
                {"ticker": "AAPL", "name": "Apple Computer", "sector": "Technology",
                 "updated_at": "2020-01-01T00:00:00Z"},
                {"ticker": "AAPL", "name": "Apple Inc.", "sector": "Technology",
                 "updated_at": "2024-01-01T00:00:00Z"},
                {"ticker": "JPM", "name": "JPMorgan Chase", "sector": "Finance"},
                {"name": "No Ticker Corp"},
            ]
        }),
    );

    let loaded = IngestService::ingest_prices(warehouse, &JsonPriceFile::new(&first))
        .await
        .unwrap();
    assert_eq!(loaded.accepted, 3);
    assert_eq!(loaded.rejected(), 0);

    let corrected = IngestService::ingest_prices(warehouse, &JsonPriceFile::new(&second))
        .await
        .unwrap();
    assert_eq!(corrected.accepted, 1);

    let companies = IngestService::ingest_companies(warehouse, &JsonCompanyFile::new(&companies))
        .await
        .unwrap();
    assert_eq!(companies.accepted, 4);
    assert_eq!(companies.rejected(), 1);
}

/// Fact rows minus the per-build load timestamp, for cross-build equality.
type FactKey = (
    Option<i64>,
    String,
    NaiveDate,
    f64,
    f64,
    f64,
    f64,
    i64,
    Option<f64>,
    f64,
);

fn stripped_facts(warehouse: &Warehouse) -> Vec<FactKey> {
    warehouse
        .price_facts()
        .unwrap()
        .into_iter()
        .map(|f| {
            (
                f.company_id,
                f.ticker,
                f.trade_date,
                f.open,
                f.high,
                f.low,
                f.close,
                f.volume,
                f.daily_change_pct,
                f.daily_range,
            )
        })
        .collect()
}

#[tokio::test]
async fn test_full_pipeline_resolves_duplicates_and_joins() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = Warehouse::open(&dir.path().join("mart.duckdb")).unwrap();
    seed(&warehouse, dir.path()).await;

    let report = PipelineService::build(&warehouse, DedupMode::Pushdown).unwrap();
    assert_eq!(report.clean_rows, 3);
    assert_eq!(report.fact_rows, 3);
    assert_eq!(report.orphan_facts, 1);
    assert_eq!(report.dimension_rows, 3);
    assert_eq!(report.duplicate_companies_collapsed, 1);
    assert!(report.fact_swapped);

    // The correction superseded the first AAPL observation.
    let clean = warehouse.clean_prices().unwrap();
    let aapl = clean.iter().find(|c| c.ticker == "AAPL").unwrap();
    assert_eq!(aapl.close, 105.0);
    assert_eq!(aapl.daily_change_pct, Some(5.0));
    assert_eq!(aapl.daily_range, 10.0);

    // One clean row per (ticker, trade_date).
    let mut keys: Vec<(String, NaiveDate)> = clean
        .iter()
        .map(|c| (c.ticker.clone(), c.trade_date))
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), clean.len());

    // Lexicographic surrogate keys over the deduplicated ticker set, with
    // the repeated AAPL resolved to its latest update.
    let dimension = warehouse.company_dim().unwrap();
    let dim_rows: Vec<(i64, &str, &str)> = dimension
        .iter()
        .map(|d| (d.company_id, d.ticker.as_str(), d.name.as_str()))
        .collect();
    assert_eq!(
        dim_rows,
        vec![
            (1, "AAPL", "Apple Inc."),
            (2, "JPM", "JPMorgan Chase"),
            (3, "MSFT", "Microsoft"),
        ]
    );

    // Orphan price survives the join with a null surrogate key.
    let facts = warehouse.price_facts().unwrap();
    assert_eq!(facts.len(), 3);
    let orphan = facts.iter().find(|f| f.ticker == "ZZZZ").unwrap();
    assert_eq!(orphan.company_id, None);
    let joined = facts.iter().find(|f| f.ticker == "AAPL").unwrap();
    assert_eq!(joined.company_id, Some(1));
}

#[tokio::test]
async fn test_rebuild_is_idempotent_modulo_load_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = Warehouse::open(&dir.path().join("mart.duckdb")).unwrap();
    seed(&warehouse, dir.path()).await;

    let first = PipelineService::build(&warehouse, DedupMode::Pushdown).unwrap();
    let first_facts = stripped_facts(&warehouse);

    let second = PipelineService::build(&warehouse, DedupMode::Pushdown).unwrap();
    let second_facts = stripped_facts(&warehouse);

    assert_eq!(first_facts, second_facts);
    assert_eq!(first.fact_rows, second.fact_rows);
    // Each materialization carries its own load timestamp.
    assert!(second.load_timestamp >= first.load_timestamp);
}

#[tokio::test]
async fn test_pushdown_and_in_memory_engines_agree() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = Warehouse::open(&dir.path().join("mart.duckdb")).unwrap();
    seed(&warehouse, dir.path()).await;

    PipelineService::build(&warehouse, DedupMode::Pushdown).unwrap();
    let pushdown_facts = stripped_facts(&warehouse);

    PipelineService::build(&warehouse, DedupMode::InMemory).unwrap();
    let in_memory_facts = stripped_facts(&warehouse);

    assert_eq!(pushdown_facts, in_memory_facts);
    assert_eq!(pushdown_facts.len(), 3);
}

#[tokio::test]
async fn test_run_records_one_audit_row() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = Warehouse::open(&dir.path().join("mart.duckdb")).unwrap();

    let prices = write_json(
        dir.path(),
        "prices.json",
        json!({
            "prices": [
                price("AAPL", "2024-01-02", 100.0, 105.0, 108.0, 98.0),
                {"ticker": "JPM", "date": "bogus"},
            ]
        }),
    );
    let companies = write_json(
        dir.path(),
        "companies.json",
        json!({
            "companies": [
                {"ticker": "AAPL", "name": "Apple Inc.", "sector": "Technology"},
            ]
        }),
    );

    let report = PipelineService::run(
        &warehouse,
        &JsonPriceFile::new(&prices),
        &JsonCompanyFile::new(&companies),
        DedupMode::Pushdown,
    )
    .await
    .unwrap();

    assert!(!report.run_id.is_empty());
    assert_eq!(report.prices.accepted, 1);
    assert_eq!(report.prices.rejections.len(), 1);
    assert_eq!(report.companies.accepted, 1);
    assert_eq!(report.build.fact_rows, 1);
    assert_eq!(report.build.orphan_facts, 0);

    let status = warehouse.status().unwrap();
    assert_eq!(status.raw_prices, 1);
    assert_eq!(status.raw_companies, 1);
    assert_eq!(status.price_facts, 1);
    assert_eq!(status.company_dim, 1);
    assert_eq!(status.pipeline_runs, 1);
}

#[tokio::test]
async fn test_unreachable_source_aborts_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let warehouse = Warehouse::open(&dir.path().join("mart.duckdb")).unwrap();

    let result =
        IngestService::ingest_prices(&warehouse, &JsonPriceFile::new("/nonexistent.json")).await;
    assert!(result.is_err());

    let status = warehouse.status().unwrap();
    assert_eq!(status.raw_prices, 0);
}
