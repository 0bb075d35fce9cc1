//! Create the message topic
//!
//! Run once; put the printed id in `COURIER_TOPIC_ID`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use courier::{
    ledger::{GatewayClient, LedgerLogClient},
    provision::TopicProvisioner,
    Config,
};

/// Create the message topic
#[derive(Parser)]
#[command(name = "courier-topic")]
#[command(about = "Create the topic courier publishes to")]
struct Args {
    /// Topic memo
    #[arg(long, default_value = "")]
    memo: String,

    /// Config file
    #[arg(short, long, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("courier_topic=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let gateway = GatewayClient::connect(&config.gateway_url)
        .await
        .with_context(|| format!("Cannot reach ledger gateway at {}", config.gateway_url))?;
    let client = LedgerLogClient::new(Arc::new(gateway), config.operator()?)
        .with_publish_timeout(config.publish_timeout());

    let topic_id = TopicProvisioner::new(client).create(&args.memo).await?;
    println!("Your topic ID is: {topic_id}");
    Ok(())
}
