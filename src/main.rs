//! Postcode checker web server
//!
//! Usage:
//!   ./target/release/postcode_checker [options]
//!
//! Endpoints:
//!   GET  /?postcode=X                  - Checker page
//!   GET  /api/v1/health                - Health check
//!   GET  /api/v1/check?postcode=X      - JSON lookup
//!   GET  /api/v1/reference             - Reference cache status
//!   POST /api/v1/reference/refresh     - Reload reference data

use anyhow::{Context, Result};
use clap::Parser;
use postcode_checker::api::{create_router, CheckerService};
use postcode_checker::config::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "postcode_checker")]
#[command(about = "Delivery area checker with referral sign-up counts")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "CHECKER_PORT", default_value = "8080")]
    port: u16,

    /// TOML configuration file
    #[arg(long, env = "CHECKER_CONFIG")]
    config: Option<PathBuf>,

    /// Postcode to sector CSV (URL or path), overrides the config file
    #[arg(long, env = "CHECKER_POLYGON_SOURCE")]
    polygon_source: Option<String>,

    /// Unserviceable users CSV (URL or path), overrides the config file
    #[arg(long, env = "CHECKER_UNSERVICEABLE_SOURCE")]
    unserviceable_source: Option<String>,

    /// Load reference data before accepting requests
    #[arg(long)]
    preload: bool,
}

fn print_banner(port: u16, config: &Config) {
    println!("============================================================");
    println!("         POSTCODE CHECKER");
    println!("============================================================");
    println!();
    println!("  Page:     http://localhost:{}/?postcode=", port);
    println!("  API:      http://localhost:{}/api/v1/", port);
    println!("  Brand:    {}", config.messaging.brand);
    println!("  Target:   {} sign ups", config.messaging.signup_target);
    println!();
    println!("============================================================");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(source) = args.polygon_source {
        config.sources.polygon = source;
    }
    if let Some(source) = args.unserviceable_source {
        config.sources.unserviceable = source;
    }

    print_banner(args.port, &config);

    let service = Arc::new(CheckerService::new(config)?);

    if args.preload {
        if let Err(e) = service.cache().get().await {
            warn!("Preload failed, will retry on first request: {}", e);
        }
    }

    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let app = create_router(service);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
