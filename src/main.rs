//! PriceMart command-line entry point

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pricemart::config::Config;
use pricemart::db::Warehouse;
use pricemart::services::ingest_service::IngestService;
use pricemart::services::pipeline_service::PipelineService;
use pricemart::sources::alpha_vantage::AlphaVantageSource;
use pricemart::sources::files::{JsonCompanyFile, JsonPriceFile};
use pricemart::sources::{CompanySource, PriceSource, UniverseCompanySource, DEFAULT_UNIVERSE};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pricemart", version, about = "Daily equity price warehouse pipeline")]
struct Cli {
    /// Warehouse file path (overrides PRICEMART_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch feeds and append them to the landing store
    Ingest(FeedArgs),
    /// Rebuild clean prices, the company dimension and the fact table
    Build,
    /// Ingest both feeds, rebuild the marts, record the run
    Run(FeedArgs),
    /// Show warehouse row counts
    Status,
}

#[derive(Args)]
struct FeedArgs {
    /// JSON file with a "prices" array; defaults to the Alpha Vantage feed
    #[arg(long)]
    prices: Option<PathBuf>,

    /// JSON file with a "companies" array; defaults to the builtin universe
    #[arg(long)]
    companies: Option<PathBuf>,
}

fn price_source(args: &FeedArgs, config: &Config) -> anyhow::Result<Box<dyn PriceSource>> {
    match &args.prices {
        Some(path) => Ok(Box::new(JsonPriceFile::new(path))),
        None => {
            let api_key = config
                .alpha_vantage_key
                .clone()
                .context("ALPHAVANTAGE_API_KEY is required when no --prices file is given")?;
            let tickers = DEFAULT_UNIVERSE
                .iter()
                .map(|c| c.ticker.to_string())
                .collect();
            Ok(Box::new(AlphaVantageSource::new(api_key, tickers)))
        }
    }
}

fn company_source(args: &FeedArgs) -> Box<dyn CompanySource> {
    match &args.companies {
        Some(path) => Box::new(JsonCompanyFile::new(path)),
        None => Box::new(UniverseCompanySource),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricemart=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let warehouse = Warehouse::open(&config.database_path)
        .with_context(|| format!("opening warehouse at {}", config.database_path.display()))?;

    match cli.command {
        Command::Ingest(args) => {
            let prices = price_source(&args, &config)?;
            let companies = company_source(&args);

            let price_result = IngestService::ingest_prices(&warehouse, prices.as_ref()).await?;
            let company_result =
                IngestService::ingest_companies(&warehouse, companies.as_ref()).await?;

            let summary = json!({
                "prices": price_result,
                "companies": company_result,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Build => {
            let report = PipelineService::build(&warehouse, config.dedup_mode)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Run(args) => {
            let prices = price_source(&args, &config)?;
            let companies = company_source(&args);

            let report = PipelineService::run(
                &warehouse,
                prices.as_ref(),
                companies.as_ref(),
                config.dedup_mode,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Status => {
            let status = warehouse.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
