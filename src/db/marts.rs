//! Derived marts: clean price view, dimension/fact publication, run audit
//!
//! The marts are never mutated in place. Each build writes staging tables
//! and renames them over the previous generation inside one transaction, so
//! concurrent readers only ever observe a complete materialization.

use super::models::{
    fmt_date, fmt_timestamp, parse_date, parse_timestamp, CleanPriceRecord, CompanyDimension,
    PriceFact,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};

/// Query the store-side deduplicated price view.
///
/// The group-and-rank work runs inside DuckDB (see the `clean_prices` view
/// definition); only the surviving one-row-per-key set crosses into process
/// memory.
pub fn load_clean_prices(conn: &Connection) -> Result<Vec<CleanPriceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT ticker, CAST(trade_date AS VARCHAR), open, high, low, close, volume,
                CAST(ingested_at AS VARCHAR), daily_change_pct, daily_range
         FROM clean_prices
         ORDER BY ticker, trade_date",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<f64>>(8)?,
                row.get::<_, f64>(9)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(
                ticker,
                trade_date,
                open,
                high,
                low,
                close,
                volume,
                ingested_at,
                daily_change_pct,
                daily_range,
            )| {
                Ok(CleanPriceRecord {
                    ticker,
                    trade_date: parse_date(&trade_date)?,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    ingested_at: parse_timestamp(&ingested_at)?,
                    daily_change_pct,
                    daily_range,
                })
            },
        )
        .collect()
}

/// Publish a freshly built dimension and fact set.
///
/// Both tables are written into `_staging` twins and renamed over the
/// previous generation in the same transaction (swap-not-mutate). A failure
/// anywhere rolls back and leaves the prior materialization serving.
pub fn publish(
    conn: &mut Connection,
    dimension: &[CompanyDimension],
    facts: &[PriceFact],
) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE OR REPLACE TABLE company_dim_staging (
            company_id BIGINT NOT NULL,
            ticker VARCHAR NOT NULL,
            name VARCHAR NOT NULL,
            sector VARCHAR
        );
        CREATE OR REPLACE TABLE price_facts_staging (
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
        );",
    )?;

    let mut dim_stmt = tx.prepare(
        "INSERT INTO company_dim_staging (company_id, ticker, name, sector)
         VALUES (?, ?, ?, ?)",
    )?;
    for row in dimension {
        dim_stmt.execute(params![row.company_id, row.ticker, row.name, row.sector])?;
    }
    drop(dim_stmt);

    let mut fact_stmt = tx.prepare(
        "INSERT INTO price_facts_staging
            (company_id, ticker, trade_date, open, high, low, close, volume,
             daily_change_pct, daily_range, load_timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for row in facts {
        fact_stmt.execute(params![
            row.company_id,
            row.ticker,
            fmt_date(row.trade_date),
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume,
            row.daily_change_pct,
            row.daily_range,
            fmt_timestamp(row.load_timestamp),
        ])?;
    }
    drop(fact_stmt);

    tx.execute_batch(
        "DROP TABLE company_dim;
         ALTER TABLE company_dim_staging RENAME TO company_dim;
         DROP TABLE price_facts;
         ALTER TABLE price_facts_staging RENAME TO price_facts;",
    )?;

    tx.commit()?;

    tracing::info!(
        "Published {} dimension rows and {} fact rows",
        dimension.len(),
        facts.len()
    );
    Ok(())
}

/// Load the current company dimension, ordered by surrogate key.
pub fn load_company_dim(conn: &Connection) -> Result<Vec<CompanyDimension>> {
    let mut stmt = conn.prepare(
        "SELECT company_id, ticker, name, sector FROM company_dim ORDER BY company_id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(CompanyDimension {
                company_id: row.get(0)?,
                ticker: row.get(1)?,
                name: row.get(2)?,
                sector: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Load the current fact table, ordered by (ticker, trade_date).
pub fn load_price_facts(conn: &Connection) -> Result<Vec<PriceFact>> {
    let mut stmt = conn.prepare(
        "SELECT company_id, ticker, CAST(trade_date AS VARCHAR), open, high, low, close, volume,
                daily_change_pct, daily_range, CAST(load_timestamp AS VARCHAR)
         FROM price_facts
         ORDER BY ticker, trade_date",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Option<i64>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, Option<f64>>(8)?,
                row.get::<_, f64>(9)?,
                row.get::<_, String>(10)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(
                company_id,
                ticker,
                trade_date,
                open,
                high,
                low,
                close,
                volume,
                daily_change_pct,
                daily_range,
                load_timestamp,
            )| {
                Ok(PriceFact {
                    company_id,
                    ticker,
                    trade_date: parse_date(&trade_date)?,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    daily_change_pct,
                    daily_range,
                    load_timestamp: parse_timestamp(&load_timestamp)?,
                })
            },
        )
        .collect()
}

/// Fact table row count.
pub fn count_price_facts(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM price_facts", [], |row| row.get(0))?;
    Ok(count)
}

/// Dimension row count.
pub fn count_company_dim(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM company_dim", [], |row| row.get(0))?;
    Ok(count)
}

/// Audit record for one full pipeline run.
#[derive(Debug, Clone)]
pub struct RunAudit {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub prices_ingested: usize,
    pub prices_rejected: usize,
    pub companies_ingested: usize,
    pub companies_rejected: usize,
    pub fact_rows: usize,
    pub orphan_facts: usize,
    pub fact_swapped: bool,
}

/// Record one pipeline run in the audit table.
pub fn record_run(conn: &Connection, audit: &RunAudit) -> Result<()> {
    conn.execute(
        "INSERT INTO pipeline_runs
            (run_id, started_at, finished_at, prices_ingested, prices_rejected,
             companies_ingested, companies_rejected, fact_rows, orphan_facts, fact_swapped)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            audit.run_id,
            fmt_timestamp(audit.started_at),
            fmt_timestamp(audit.finished_at),
            audit.prices_ingested as i64,
            audit.prices_rejected as i64,
            audit.companies_ingested as i64,
            audit.companies_rejected as i64,
            audit.fact_rows as i64,
            audit.orphan_facts as i64,
            audit.fact_swapped,
        ],
    )?;
    Ok(())
}

/// Audit table row count.
pub fn count_runs(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM pipeline_runs", [], |row| row.get(0))?;
    Ok(count)
}
