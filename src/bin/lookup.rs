//! One-shot postcode lookup against the reference data
//!
//! Usage:
//!   cargo run --release --bin lookup -- [--config PATH] POSTCODE...
//!
//! Prints one line per postcode. Exits non-zero if the reference data
//! cannot be loaded.

use anyhow::{bail, Result};
use clap::Parser;
use postcode_checker::api::{CheckOutcome, CheckerService};
use postcode_checker::config::Config;
use postcode_checker::render::{build_view, render_text};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lookup")]
#[command(about = "Check postcodes against the delivery reference data")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "CHECKER_CONFIG")]
    config: Option<PathBuf>,

    /// Postcode to sector CSV (URL or path)
    #[arg(long, env = "CHECKER_POLYGON_SOURCE")]
    polygon_source: Option<String>,

    /// Unserviceable users CSV (URL or path)
    #[arg(long, env = "CHECKER_UNSERVICEABLE_SOURCE")]
    unserviceable_source: Option<String>,

    /// Print the raw outcome as JSON
    #[arg(long)]
    json: bool,

    /// Postcodes to check
    #[arg(required = true)]
    postcodes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(source) = args.polygon_source {
        config.sources.polygon = source;
    }
    if let Some(source) = args.unserviceable_source {
        config.sources.unserviceable = source;
    }

    let service = CheckerService::new(config)?;

    for raw in &args.postcodes {
        let outcome = service.check(Some(raw)).await;
        if let CheckOutcome::LoadFailed { .. } = outcome {
            bail!("reference data could not be loaded");
        }

        if args.json {
            println!("{}", serde_json::to_string(&outcome)?);
        } else {
            let view = build_view(&outcome, &service.config().messaging);
            println!("{}: {}", raw.trim(), render_text(&view).replace('\n', " | "));
        }
    }

    Ok(())
}
