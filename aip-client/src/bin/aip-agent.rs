//! AIP agent binary.
//!
//! Runs discover, submit and (optionally) bind against a provider and prints
//! every artifact as JSON.
//!
//! # Usage
//! ```bash
//! aip-agent --url http://localhost:3000 --intake bmi --data '{"height_inches":70,"weight_lbs":180}'
//! aip-agent --url http://localhost:3000 --list
//! ```

use std::time::Duration;

use aip_client::{AipClient, ClientConfig, FlowResult};
use aip_core::AipResponse;
use clap::Parser;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

/// AIP Agent - Agent Intake Protocol command line client
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider base URL
    #[arg(short, long, env = "AIP_PROVIDER_URL", default_value = "http://localhost:3000")]
    url: String,

    /// Only list the provider's intakes
    #[arg(long)]
    list: bool,

    /// Intake id to submit to
    #[arg(short, long, required_unless_present = "list")]
    intake: Option<String>,

    /// Intake data as a JSON object
    #[arg(short, long, default_value = "{}")]
    data: String,

    /// Bind data as a JSON object; binds when the offer allows it
    #[arg(short, long)]
    bind: Option<String>,

    /// Agent id (default: aip-client-<random>)
    #[arg(long, env = "AIP_AGENT_ID")]
    agent_id: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_object(flag: &str, raw: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("--{} is not valid JSON: {}", flag, e))?;
    anyhow::ensure!(value.is_object(), "--{} must be a JSON object", flag);
    Ok(value)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::new(&args.url)
        .with_platform("aip-agent")
        .with_timeout(Duration::from_secs(args.timeout_secs));
    if let Some(agent_id) = args.agent_id {
        config = config.with_agent_id(agent_id);
    }
    let mut client = AipClient::with_config(config)?;

    if args.list {
        client.discover().await?;
        println!("{}", serde_json::to_string_pretty(client.list_intakes()?)?);
        return Ok(());
    }

    let intake = args
        .intake
        .ok_or_else(|| anyhow::anyhow!("--intake is required"))?;
    let data = parse_object("data", &args.data)?;
    let bind = args
        .bind
        .as_deref()
        .map(|raw| parse_object("bind", raw))
        .transpose()?;

    let flow = client.full_flow(&intake, data, bind).await?;
    println!("{}", serde_json::to_string_pretty(&render_flow(flow))?);
    Ok(())
}

/// Flow output, with the offer in its wire shape.
fn render_flow(flow: FlowResult) -> Value {
    json!({
        "manifest": flow.manifest,
        "offer": AipResponse::Offer(flow.offer),
        "bind": flow.bind,
    })
}
