//! Pipeline orchestration
//!
//! One run is: ingest both feeds, take a landing snapshot, resolve clean
//! prices and the company dimension, assemble facts, and atomically swap
//! the published marts. The raw tables are treated as frozen for the
//! duration of a run; the warehouse lock is the snapshot boundary.

use crate::config::DedupMode;
use crate::db::marts::RunAudit;
use crate::db::Warehouse;
use crate::error::Result;
use crate::services::ingest_service::{IngestService, LoadResult};
use crate::sources::{CompanySource, PriceSource};
use crate::transform::{companies, facts, prices};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of one mart build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub clean_rows: usize,
    pub dimension_rows: usize,
    pub dropped_invalid_companies: usize,
    pub duplicate_companies_collapsed: usize,
    pub fact_rows: usize,
    pub orphan_facts: usize,
    pub load_timestamp: DateTime<Utc>,
    pub fact_swapped: bool,
}

/// Outcome of one full pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub prices: LoadResult,
    pub companies: LoadResult,
    pub build: BuildReport,
}

/// Pipeline service for mart builds and full runs
pub struct PipelineService;

impl PipelineService {
    /// Rebuild the marts from the current landing state.
    ///
    /// Derived tables are recomputed in full from raw rows on every build;
    /// nothing is merged incrementally. Consumers keep seeing the previous
    /// generation until the final swap commits.
    pub fn build(warehouse: &Warehouse, mode: DedupMode) -> Result<BuildReport> {
        info!("Building marts (dedup engine: {:?})", mode);

        let (clean, dimension_build) = match mode {
            DedupMode::Pushdown => {
                // Group-and-rank runs inside the store; only the surviving
                // rows and the raw company feed cross into memory.
                let (clean, raw_companies) = warehouse.clean_snapshot()?;
                (clean, companies::build(raw_companies))
            }
            DedupMode::InMemory => {
                let snapshot = warehouse.raw_snapshot()?;
                // No data dependency between the two resolutions; join is
                // the barrier the fact assembly waits on.
                let (clean, dimension_build) = rayon::join(
                    || prices::resolve(snapshot.prices),
                    || companies::build(snapshot.companies),
                );
                (clean, dimension_build)
            }
        };

        let clean_rows = clean.len();
        let load_timestamp = Utc::now();
        let fact_rows = facts::assemble(clean, &dimension_build.rows, load_timestamp);
        let orphan_facts = facts::count_orphans(&fact_rows);

        if dimension_build.duplicates_collapsed > 0 {
            warn!(
                "Company feed repeated {} ticker rows; latest update kept",
                dimension_build.duplicates_collapsed
            );
        }

        warehouse.publish(&dimension_build.rows, &fact_rows)?;

        let report = BuildReport {
            clean_rows,
            dimension_rows: dimension_build.rows.len(),
            dropped_invalid_companies: dimension_build.dropped_invalid,
            duplicate_companies_collapsed: dimension_build.duplicates_collapsed,
            fact_rows: fact_rows.len(),
            orphan_facts,
            load_timestamp,
            fact_swapped: true,
        };

        info!(
            "Mart build done: {} clean prices, {} dimension rows, {} facts ({} orphans)",
            report.clean_rows, report.dimension_rows, report.fact_rows, report.orphan_facts
        );

        Ok(report)
    }

    /// Ingest both feeds, rebuild the marts, and record the run.
    pub async fn run(
        warehouse: &Warehouse,
        price_source: &dyn PriceSource,
        company_source: &dyn CompanySource,
        mode: DedupMode,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("Pipeline run {} starting", run_id);

        let prices = IngestService::ingest_prices(warehouse, price_source).await?;
        let companies = IngestService::ingest_companies(warehouse, company_source).await?;

        let build_result = Self::build(warehouse, mode);
        let finished_at = Utc::now();

        // The audit row is written for failed builds too, with the swap
        // flag cleared, so the run history shows what never published.
        let (fact_rows, orphan_facts, fact_swapped) = match &build_result {
            Ok(build) => (build.fact_rows, build.orphan_facts, true),
            Err(_) => (0, 0, false),
        };
        let audit = RunAudit {
            run_id: run_id.clone(),
            started_at,
            finished_at,
            prices_ingested: prices.accepted,
            prices_rejected: prices.rejected(),
            companies_ingested: companies.accepted,
            companies_rejected: companies.rejected(),
            fact_rows,
            orphan_facts,
            fact_swapped,
        };
        if let Err(e) = warehouse.record_run(&audit) {
            warn!("Failed to record run audit: {}", e);
        }

        let build = build_result?;
        info!("Pipeline run {} complete", run_id);

        Ok(RunReport {
            run_id,
            prices,
            companies,
            build,
        })
    }
}
