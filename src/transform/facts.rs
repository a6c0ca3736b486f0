//! Fact assembly
//!
//! Pure left join of clean prices onto the company dimension. All dedup
//! correctness is established upstream; this step only attaches surrogate
//! keys and the batch load timestamp.

use crate::db::models::{CleanPriceRecord, CompanyDimension, PriceFact};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Join clean prices to the dimension on ticker.
///
/// Every clean row yields exactly one fact row. Prices without a dimension
/// match are orphans: kept, with a null company_id. One load_timestamp is
/// stamped across the whole batch.
pub fn assemble(
    clean: Vec<CleanPriceRecord>,
    dimension: &[CompanyDimension],
    load_timestamp: DateTime<Utc>,
) -> Vec<PriceFact> {
    let keys_by_ticker: HashMap<&str, i64> = dimension
        .iter()
        .map(|d| (d.ticker.as_str(), d.company_id))
        .collect();

    clean
        .into_iter()
        .map(|price| PriceFact {
            company_id: keys_by_ticker.get(price.ticker.as_str()).copied(),
            ticker: price.ticker,
            trade_date: price.trade_date,
            open: price.open,
            high: price.high,
            low: price.low,
            close: price.close,
            volume: price.volume,
            daily_change_pct: price.daily_change_pct,
            daily_range: price.daily_range,
            load_timestamp,
        })
        .collect()
}

/// Orphan facts in a batch (null company_id). Not an error state, but
/// counted and reported per run.
pub fn count_orphans(facts: &[PriceFact]) -> usize {
    facts.iter().filter(|f| f.company_id.is_none()).count()
}
