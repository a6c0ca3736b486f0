//! Company dimension builder
//!
//! Filters invalid rows, collapses repeated tickers to the most recently
//! updated row, and assigns dense surrogate keys in lexicographic ticker
//! order. Keys are recomputed from scratch on every build; they are not
//! stable across builds when the ticker set changes.

use crate::db::models::{CompanyDimension, RawCompanyRecord};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Result of one dimension build, with data-quality counters.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionBuild {
    pub rows: Vec<CompanyDimension>,
    /// Rows dropped for a missing ticker or name.
    pub dropped_invalid: usize,
    /// Extra rows absorbed by ticker-level dedup. Non-zero means the feed
    /// repeated tickers; surfaced so the repeat rate is visible per run.
    pub duplicates_collapsed: usize,
}

/// Build the company dimension from raw landing rows.
///
/// Repeated tickers resolve to the row with the maximum
/// (updated_at, ingest_seq) before any surrogate key is assigned, so a
/// ticker can never appear under two company_ids.
pub fn build(rows: Vec<RawCompanyRecord>) -> DimensionBuild {
    let mut dropped_invalid = 0usize;
    let mut duplicates_collapsed = 0usize;
    let mut newest: HashMap<String, RawCompanyRecord> = HashMap::new();

    for row in rows {
        let ticker = match row.ticker.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => {
                dropped_invalid += 1;
                continue;
            }
        };
        if row.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).is_none() {
            dropped_invalid += 1;
            continue;
        }

        match newest.entry(ticker) {
            Entry::Occupied(mut slot) => {
                duplicates_collapsed += 1;
                let held = slot.get();
                if (row.updated_at, row.ingest_seq) > (held.updated_at, held.ingest_seq) {
                    slot.insert(row);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
        }
    }

    let mut survivors: Vec<(String, RawCompanyRecord)> = newest.into_iter().collect();
    survivors.sort_by(|a, b| a.0.cmp(&b.0));

    let rows = survivors
        .into_iter()
        .enumerate()
        .map(|(i, (ticker, record))| CompanyDimension {
            company_id: i as i64 + 1,
            ticker,
            // Presence was checked before dedup; unwrap_or_default is
            // unreachable but keeps this total.
            name: record.name.map(|n| n.trim().to_string()).unwrap_or_default(),
            sector: record
                .sector
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
        .collect();

    DimensionBuild {
        rows,
        dropped_invalid,
        duplicates_collapsed,
    }
}
