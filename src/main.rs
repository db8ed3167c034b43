//! Command-line entry point: scores one address and prints the report as JSON.
//!
//! 1. Parse arguments, load configuration, initialise tracing
//! 2. Load the season's achievement catalog
//! 3. Wire upstream sources, name resolvers and the score cache
//! 4. Evaluate and print

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{filter::{Directive, EnvFilter}, layer::SubscriberExt, util::SubscriberInitExt};

use chainscore::{
    config::Config, errors::ScoreError, metrics, AddressScorer, Catalog, ScoreRequest,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to score (hex, optionally `0x`-prefixed).
    address: String,

    /// Domain name the address claims (e.g. "alice.crypto").
    #[arg(long)]
    name: Option<String>,

    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config/score.json")]
    config: PathBuf,

    /// Ignore fresh cached scores and always re-scan.
    #[arg(long)]
    dev: bool,

    /// Print Prometheus metrics after the report.
    #[arg(long)]
    metrics: bool,
}

fn init_tracing(default_level: &str) -> Result<(), ScoreError> {
    let directive = |d: &str| -> Result<Directive, ScoreError> {
        d.parse::<Directive>()
            .map_err(|e| ScoreError::Config(format!("invalid log directive '{}': {}", d, e)))
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| ScoreError::Config(format!("invalid log level: {}", e)))?
        .add_directive(directive("ethers_providers=warn")?)
        .add_directive(directive("sqlx=warn")?)
        .add_directive(directive("reqwest=warn")?)
        .add_directive(directive("hyper=warn")?);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ScoreError> {
    let args = Args::parse();

    let mut config = Config::load_or_default(&args.config).await?;
    config.development |= args.dev;
    init_tracing(&config.log_level)?;
    info!(season = config.season, development = config.development, "Configuration loaded");

    let catalog = Arc::new(Catalog::load(&config.catalog_path).await?);
    let scorer = AddressScorer::from_config(&config, catalog).await?;

    let request = ScoreRequest::new(args.address, config.season)
        .with_name(args.name.as_deref())
        .with_development(config.development);
    let report = scorer.score(request).await;

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|e| ScoreError::Other(format!("failed to render report: {}", e)))?;
    println!("{}", rendered);

    if args.metrics {
        eprintln!("{}", metrics::gather());
    }
    Ok(())
}
