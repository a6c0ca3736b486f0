//! Warehouse schema migrations

use crate::error::Result;
use duckdb::Connection;

/// Run all warehouse migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Migrations tracking table (name is the primary key since we don't
    // need auto-increment)
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            name VARCHAR PRIMARY KEY,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    )?;

    run_migration(conn, "001_raw_prices", CREATE_RAW_PRICES)?;
    run_migration(conn, "002_raw_companies", CREATE_RAW_COMPANIES)?;
    run_migration(conn, "003_clean_prices_view", CREATE_CLEAN_PRICES_VIEW)?;
    run_migration(conn, "004_marts", CREATE_MARTS)?;
    run_migration(conn, "005_pipeline_runs", CREATE_PIPELINE_RUNS)?;

    tracing::debug!("Warehouse migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM migrations WHERE name = ?",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running warehouse migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

// Landing tables are append-only: the loader is the single writer, rows are
// never updated or deleted, and ingest_seq records insertion order.
const CREATE_RAW_PRICES: &str = r#"
CREATE SEQUENCE IF NOT EXISTS raw_prices_seq;

CREATE TABLE IF NOT EXISTS raw_prices (
    ingest_seq BIGINT PRIMARY KEY DEFAULT nextval('raw_prices_seq'),
    ticker VARCHAR NOT NULL,
    trade_date DATE,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    ingested_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_prices_key ON raw_prices(ticker, trade_date);
"#;

const CREATE_RAW_COMPANIES: &str = r#"
CREATE SEQUENCE IF NOT EXISTS raw_companies_seq;

CREATE TABLE IF NOT EXISTS raw_companies (
    ingest_seq BIGINT PRIMARY KEY DEFAULT nextval('raw_companies_seq'),
    ticker VARCHAR,
    name VARCHAR,
    sector VARCHAR,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_companies_ticker ON raw_companies(ticker);
"#;

// Store-side rendition of the price deduplicator: keep the newest landing
// row per (ticker, trade_date), ordered by ingested_at with ingest_seq as
// the tie-break, then drop rows that fail the clean invariants.
const CREATE_CLEAN_PRICES_VIEW: &str = r#"
CREATE OR REPLACE VIEW clean_prices AS
SELECT
    ticker,
    trade_date,
    open,
    high,
    low,
    close,
    volume,
    ingested_at,
    CASE WHEN open = 0 THEN NULL
         ELSE ROUND((close - open) / open * 100, 2)
    END AS daily_change_pct,
    ROUND(high - low, 2) AS daily_range
FROM (
    SELECT *,
           row_number() OVER (
               PARTITION BY ticker, trade_date
               ORDER BY ingested_at DESC, ingest_seq DESC
           ) AS rn
    FROM raw_prices
)
WHERE rn = 1
  AND trade_date IS NOT NULL
  AND close > 0;
"#;

// Marts start empty and are fully replaced by each pipeline build via
// staging tables renamed over these in a single transaction.
const CREATE_MARTS: &str = r#"
CREATE TABLE IF NOT EXISTS company_dim (
    company_id BIGINT NOT NULL,
    ticker VARCHAR NOT NULL,
    name VARCHAR NOT NULL,
    sector VARCHAR
);

CREATE TABLE IF NOT EXISTS price_facts (
    company_id BIGINT,
    ticker VARCHAR NOT NULL,
    trade_date DATE NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    daily_change_pct DOUBLE,
    daily_range DOUBLE NOT NULL,
    load_timestamp TIMESTAMP NOT NULL
);
"#;

const CREATE_PIPELINE_RUNS: &str = r#"
CREATE TABLE IF NOT EXISTS pipeline_runs (
    run_id VARCHAR PRIMARY KEY,
    started_at TIMESTAMP NOT NULL,
    finished_at TIMESTAMP,
    prices_ingested BIGINT NOT NULL DEFAULT 0,
    prices_rejected BIGINT NOT NULL DEFAULT 0,
    companies_ingested BIGINT NOT NULL DEFAULT 0,
    companies_rejected BIGINT NOT NULL DEFAULT 0,
    fact_rows BIGINT NOT NULL DEFAULT 0,
    orphan_facts BIGINT NOT NULL DEFAULT 0,
    fact_swapped BOOLEAN NOT NULL DEFAULT FALSE
);
"#;
