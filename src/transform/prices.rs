//! Price deduplication and per-day metrics
//!
//! In-memory engine for the last-writer-wins resolution over the append-only
//! landing log. Semantics are identical to the store-side `clean_prices`
//! view: per (ticker, trade_date) the row with the maximum
//! (ingested_at, ingest_seq) survives, then rows with a null trade_date or
//! non-positive close are discarded and daily metrics are derived.

use crate::db::models::{CleanPriceRecord, RawPriceRecord};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Round to two decimal places, half away from zero.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Close-over-open percentage move. None when open is zero: the metric is
/// undefined and the policy is to emit null, never to divide.
pub fn daily_change_pct(open: f64, close: f64) -> Option<f64> {
    if open == 0.0 {
        None
    } else {
        Some(round2((close - open) / open * 100.0))
    }
}

/// Intraday high-low spread.
pub fn daily_range(high: f64, low: f64) -> f64 {
    round2(high - low)
}

/// Collapse raw landing rows into at most one clean record per
/// (ticker, trade_date).
///
/// Rows are partitioned by ticker hash and each partition is resolved
/// independently on the rayon pool; a dedup key never spans partitions, so
/// concatenating the partition outputs preserves the uniqueness invariant.
/// Output order is unspecified.
pub fn resolve(rows: Vec<RawPriceRecord>) -> Vec<CleanPriceRecord> {
    let partition_count = rayon::current_num_threads().max(1);
    let mut partitions: Vec<Vec<RawPriceRecord>> = (0..partition_count).map(|_| Vec::new()).collect();

    for row in rows {
        let index = (ticker_hash(&row.ticker) as usize) % partition_count;
        partitions[index].push(row);
    }

    partitions
        .into_par_iter()
        .flat_map_iter(resolve_partition)
        .collect()
}

fn ticker_hash(ticker: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    ticker.hash(&mut hasher);
    hasher.finish()
}

/// Streaming group-by over one partition: a single pass tracking the
/// newest row per key, so memory scales with distinct keys rather than
/// raw row count.
fn resolve_partition(rows: Vec<RawPriceRecord>) -> Vec<CleanPriceRecord> {
    let mut newest: HashMap<(String, Option<NaiveDate>), RawPriceRecord> = HashMap::new();

    for row in rows {
        match newest.entry((row.ticker.clone(), row.trade_date)) {
            Entry::Occupied(mut slot) => {
                let held = slot.get();
                // ingest_seq breaks ingested_at ties deterministically:
                // the later-landed row wins.
                if (row.ingested_at, row.ingest_seq) > (held.ingested_at, held.ingest_seq) {
                    slot.insert(row);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
        }
    }

    newest.into_values().filter_map(into_clean).collect()
}

/// Apply the clean invariants to a selected row and derive metrics.
/// Violating rows are excluded, not corrected.
fn into_clean(row: RawPriceRecord) -> Option<CleanPriceRecord> {
    let trade_date = row.trade_date?;
    if row.close <= 0.0 {
        return None;
    }

    Some(CleanPriceRecord {
        daily_change_pct: daily_change_pct(row.open, row.close),
        daily_range: daily_range(row.high, row.low),
        ticker: row.ticker,
        trade_date,
        open: row.open,
        high: row.high,
        low: row.low,
        close: row.close,
        volume: row.volume,
        ingested_at: row.ingested_at,
    })
}
