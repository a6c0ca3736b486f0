//! Append-only landing store
//!
//! The ingestion loader is the only writer. Rows are appended inside a
//! transaction and never mutated afterwards; corrections arrive as new rows
//! and are resolved downstream by the deduplicator.

use super::models::{
    fmt_date, fmt_timestamp, parse_date, parse_timestamp, RawCompanyRecord, RawPriceRecord,
};
use crate::error::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use duckdb::{params, Connection};

/// A validated price row ready to land.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceRow {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// A validated company row ready to land.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCompanyRow {
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append validated price rows in one transaction.
///
/// Each row gets `ingested_at = batch_start + row_index µs`, strictly
/// monotonic within the batch so downstream tie-breaks stay deterministic.
pub fn append_prices(
    conn: &mut Connection,
    rows: &[NewPriceRow],
    batch_start: DateTime<Utc>,
) -> Result<usize> {
    let tx = conn.transaction()?;

    let mut stmt = tx.prepare(
        "INSERT INTO raw_prices (ticker, trade_date, open, high, low, close, volume, ingested_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )?;

    for (i, row) in rows.iter().enumerate() {
        let ingested_at = batch_start + Duration::microseconds(i as i64);
        stmt.execute(params![
            row.ticker,
            fmt_date(row.trade_date),
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume,
            fmt_timestamp(ingested_at),
        ])?;
    }

    drop(stmt);
    tx.commit()?;

    tracing::info!("Landed {} price rows", rows.len());
    Ok(rows.len())
}

/// Append validated company rows in one transaction.
pub fn append_companies(conn: &mut Connection, rows: &[NewCompanyRow]) -> Result<usize> {
    let tx = conn.transaction()?;

    let mut stmt = tx.prepare(
        "INSERT INTO raw_companies (ticker, name, sector, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.ticker,
            row.name,
            row.sector,
            fmt_timestamp(row.created_at),
            fmt_timestamp(row.updated_at),
        ])?;
    }

    drop(stmt);
    tx.commit()?;

    tracing::info!("Landed {} company rows", rows.len());
    Ok(rows.len())
}

/// Load every landing price row in insertion order.
pub fn load_raw_prices(conn: &Connection) -> Result<Vec<RawPriceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT ingest_seq, ticker, CAST(trade_date AS VARCHAR), open, high, low, close, volume,
                CAST(ingested_at AS VARCHAR)
         FROM raw_prices
         ORDER BY ingest_seq",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(ingest_seq, ticker, trade_date, open, high, low, close, volume, ingested_at)| {
                Ok(RawPriceRecord {
                    ingest_seq,
                    ticker,
                    trade_date: trade_date.map(|s| parse_date(&s)).transpose()?,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    ingested_at: parse_timestamp(&ingested_at)?,
                })
            },
        )
        .collect()
}

/// Load every landing company row in insertion order.
pub fn load_raw_companies(conn: &Connection) -> Result<Vec<RawCompanyRecord>> {
    let mut stmt = conn.prepare(
        "SELECT ingest_seq, ticker, name, sector, CAST(created_at AS VARCHAR),
                CAST(updated_at AS VARCHAR)
         FROM raw_companies
         ORDER BY ingest_seq",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(ingest_seq, ticker, name, sector, created_at, updated_at)| {
            Ok(RawCompanyRecord {
                ingest_seq,
                ticker,
                name,
                sector,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
            })
        })
        .collect()
}

/// Landing price row count.
pub fn count_raw_prices(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM raw_prices", [], |row| row.get(0))?;
    Ok(count)
}

/// Landing company row count.
pub fn count_raw_companies(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM raw_companies", [], |row| row.get(0))?;
    Ok(count)
}
