//! DuckDB warehouse module
//!
//! One embedded database holds the append-only landing tables, the
//! deduplicated `clean_prices` view, and the published marts. The
//! `Warehouse` wrapper serializes access through a mutex; within one
//! process the loader is the only writer, so a single lock hold doubles as
//! the stable snapshot boundary for a pipeline run.

pub mod landing;
pub mod marts;
mod migrations;
pub mod models;

use crate::error::Result;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use landing::{NewCompanyRow, NewPriceRow};
use models::{CleanPriceRecord, CompanyDimension, PriceFact, RawCompanyRecord, RawPriceRecord};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;

/// Frozen view of the landing store taken at run start.
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    pub prices: Vec<RawPriceRecord>,
    pub companies: Vec<RawCompanyRecord>,
}

/// Row counts across the warehouse, for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct WarehouseStatus {
    pub raw_prices: i64,
    pub raw_companies: i64,
    pub company_dim: i64,
    pub price_facts: i64,
    pub pipeline_runs: i64,
}

/// DuckDB warehouse wrapper
pub struct Warehouse {
    conn: Mutex<Connection>,
}

impl Warehouse {
    /// Open (or create) the warehouse file and apply migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let warehouse = Self {
            conn: Mutex::new(conn),
        };
        warehouse.run_migrations()?;
        Ok(warehouse)
    }

    /// Open an in-memory warehouse (tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let warehouse = Self {
            conn: Mutex::new(conn),
        };
        warehouse.run_migrations()?;
        Ok(warehouse)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    /// Append validated price rows to the landing store.
    pub fn append_prices(&self, rows: &[NewPriceRow], batch_start: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn.lock();
        landing::append_prices(&mut conn, rows, batch_start)
    }

    /// Append validated company rows to the landing store.
    pub fn append_companies(&self, rows: &[NewCompanyRow]) -> Result<usize> {
        let mut conn = self.conn.lock();
        landing::append_companies(&mut conn, rows)
    }

    /// Read both landing tables under a single lock hold.
    ///
    /// Used by the in-memory dedup engine; the lock guarantees the two
    /// reads observe the same landing state.
    pub fn raw_snapshot(&self) -> Result<RawSnapshot> {
        let conn = self.conn.lock();
        Ok(RawSnapshot {
            prices: landing::load_raw_prices(&conn)?,
            companies: landing::load_raw_companies(&conn)?,
        })
    }

    /// Read the store-side deduplicated prices plus raw companies under a
    /// single lock hold. Used by the pushdown dedup engine.
    pub fn clean_snapshot(&self) -> Result<(Vec<CleanPriceRecord>, Vec<RawCompanyRecord>)> {
        let conn = self.conn.lock();
        Ok((
            marts::load_clean_prices(&conn)?,
            landing::load_raw_companies(&conn)?,
        ))
    }

    /// Query the `clean_prices` view on its own.
    pub fn clean_prices(&self) -> Result<Vec<CleanPriceRecord>> {
        let conn = self.conn.lock();
        marts::load_clean_prices(&conn)
    }

    /// Atomically replace both marts with a freshly built generation.
    pub fn publish(&self, dimension: &[CompanyDimension], facts: &[PriceFact]) -> Result<()> {
        let mut conn = self.conn.lock();
        marts::publish(&mut conn, dimension, facts)
    }

    /// Current company dimension.
    pub fn company_dim(&self) -> Result<Vec<CompanyDimension>> {
        let conn = self.conn.lock();
        marts::load_company_dim(&conn)
    }

    /// Current fact table.
    pub fn price_facts(&self) -> Result<Vec<PriceFact>> {
        let conn = self.conn.lock();
        marts::load_price_facts(&conn)
    }

    /// Record a completed pipeline run in the audit table.
    pub fn record_run(&self, audit: &marts::RunAudit) -> Result<()> {
        let conn = self.conn.lock();
        marts::record_run(&conn, audit)
    }

    /// Row counts across landing tables, marts and the run audit.
    pub fn status(&self) -> Result<WarehouseStatus> {
        let conn = self.conn.lock();
        Ok(WarehouseStatus {
            raw_prices: landing::count_raw_prices(&conn)?,
            raw_companies: landing::count_raw_companies(&conn)?,
            company_dim: marts::count_company_dim(&conn)?,
            price_facts: marts::count_price_facts(&conn)?,
            pipeline_runs: marts::count_runs(&conn)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn price(ticker: &str, trade_date: &str, close: f64) -> NewPriceRow {
        NewPriceRow {
            ticker: ticker.to_string(),
            trade_date: date(trade_date),
            open: 100.0,
            high: 112.0,
            low: 99.0,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn test_append_assigns_monotonic_ingested_at() {
        let wh = Warehouse::open_in_memory().unwrap();
        let batch = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();

        wh.append_prices(
            &[
                price("AAPL", "2024-01-02", 110.0),
                price("AAPL", "2024-01-02", 105.0),
                price("MSFT", "2024-01-02", 390.0),
            ],
            batch,
        )
        .unwrap();

        let snapshot = wh.raw_snapshot().unwrap();
        assert_eq!(snapshot.prices.len(), 3);
        for pair in snapshot.prices.windows(2) {
            assert!(pair[0].ingested_at < pair[1].ingested_at);
            assert!(pair[0].ingest_seq < pair[1].ingest_seq);
        }
    }

    #[test]
    fn test_clean_view_keeps_newest_row_per_key() {
        let wh = Warehouse::open_in_memory().unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 1, 3, 6, 0, 0).unwrap();

        wh.append_prices(&[price("AAPL", "2024-01-02", 110.0)], first)
            .unwrap();
        wh.append_prices(&[price("AAPL", "2024-01-02", 105.0)], second)
            .unwrap();

        let clean = wh.clean_prices().unwrap();
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].close, 105.0);
        assert_eq!(clean[0].daily_change_pct, Some(5.0));
        assert_eq!(clean[0].daily_range, 13.0);
    }

    #[test]
    fn test_clean_view_drops_non_positive_close() {
        let wh = Warehouse::open_in_memory().unwrap();
        let batch = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();

        wh.append_prices(
            &[price("AAPL", "2024-01-02", 0.0), price("MSFT", "2024-01-02", 390.0)],
            batch,
        )
        .unwrap();

        let clean = wh.clean_prices().unwrap();
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].ticker, "MSFT");
    }

    #[test]
    fn test_publish_replaces_previous_generation() {
        let wh = Warehouse::open_in_memory().unwrap();
        let load_ts = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();

        let dim = vec![CompanyDimension {
            company_id: 1,
            ticker: "AAPL".to_string(),
            name: "Apple Inc.".to_string(),
            sector: Some("Technology".to_string()),
        }];
        let fact = PriceFact {
            company_id: Some(1),
            ticker: "AAPL".to_string(),
            trade_date: date("2024-01-02"),
            open: 100.0,
            high: 112.0,
            low: 99.0,
            close: 105.0,
            volume: 1_000,
            daily_change_pct: Some(5.0),
            daily_range: 13.0,
            load_timestamp: load_ts,
        };

        wh.publish(&dim, &[fact.clone(), fact.clone()]).unwrap();
        assert_eq!(wh.price_facts().unwrap().len(), 2);

        // Second publish fully replaces the first, not appends.
        wh.publish(&dim, &[fact]).unwrap();
        assert_eq!(wh.price_facts().unwrap().len(), 1);
        assert_eq!(wh.company_dim().unwrap().len(), 1);
    }
}
