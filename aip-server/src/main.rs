//! AIP provider binary.
//!
//! Serves the demo intakes (`bmi`, `metabolic-assessment`).
//!
//! # Usage
//! ```bash
//! aip-server [--host 127.0.0.1] [--port 3000] [--base-url http://localhost:3000] [--verbose]
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use aip_core::ProviderInfo;
use aip_server::demo::register_demo_intakes;
use aip_server::{ProviderEngine, Server, ServerConfig};
use chrono::Duration;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// AIP Server - Agent Intake Protocol provider
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "AIP_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "AIP_PORT", default_value = "3000")]
    port: u16,

    /// Public URL agents reach this provider at (default: http://localhost:<port>)
    #[arg(long, env = "AIP_BASE_URL")]
    base_url: Option<String>,

    /// Provider name advertised in the manifest
    #[arg(long, env = "AIP_PROVIDER_NAME", default_value = "AIP Demo Provider")]
    provider_name: String,

    /// Provider homepage advertised in the manifest (default: the base URL)
    #[arg(long, env = "AIP_PROVIDER_URL")]
    provider_url: Option<String>,

    /// Default offer lifetime in seconds
    #[arg(long, env = "AIP_OFFER_TTL_SECS", default_value = "604800")]
    offer_ttl_secs: i64,

    /// Seconds between sweeps of expired offers
    #[arg(long, env = "AIP_SWEEP_SECS", default_value = "60")]
    sweep_secs: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let base_url = args
        .base_url
        .unwrap_or_else(|| format!("http://localhost:{}", args.port));
    let provider_url = args.provider_url.unwrap_or_else(|| base_url.clone());

    let offer_ttl = Duration::try_seconds(args.offer_ttl_secs)
        .ok_or_else(|| anyhow::anyhow!("--offer-ttl-secs {} is out of range", args.offer_ttl_secs))?;

    let config = ServerConfig::with_addr(SocketAddr::new(args.host, args.port))
        .with_base_url(base_url)
        .with_provider(
            ProviderInfo::new(args.provider_name, provider_url)
                .with_description("Demo intakes for the Agent Intake Protocol"),
        )
        .with_offer_ttl(offer_ttl)
        .with_sweep_interval(StdDuration::from_secs(args.sweep_secs));

    let engine = Arc::new(ProviderEngine::new(&config)?);
    register_demo_intakes(&engine)?;

    tracing::info!("Discovery: {}", aip_core::manifest::discovery_url(&config.base_url));

    Server::new(config, engine).run().await?;
    Ok(())
}
