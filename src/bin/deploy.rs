//! Deploy the notary contract
//!
//! Uploads the compiled bytecode to the file service in 4096-byte chunks and
//! instantiates the contract, paying with the configured operator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use courier::{
    ledger::{GatewayClient, LedgerLogClient},
    provision::{Artifact, Deployer, CONTRACT_GAS},
    Config,
};

/// Deploy the notary contract
#[derive(Parser)]
#[command(name = "courier-deploy")]
#[command(about = "Upload contract bytecode and instantiate it")]
struct Args {
    /// Compiled contract artifact (JSON with a "bytecode" field)
    #[arg(default_value = "build/contracts/MessageLogger.json")]
    artifact: PathBuf,

    /// Config file
    #[arg(short, long, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Gas ceiling for the constructor
    #[arg(long, default_value_t = CONTRACT_GAS)]
    gas: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("courier_deploy=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let artifact = Artifact::from_file(&args.artifact)?;

    let gateway = GatewayClient::connect(&config.gateway_url)
        .await
        .with_context(|| format!("Cannot reach ledger gateway at {}", config.gateway_url))?;
    let client = LedgerLogClient::new(Arc::new(gateway), config.operator()?)
        .with_publish_timeout(config.publish_timeout());

    let receipt = Deployer::new(client).with_gas(args.gas).deploy(&artifact).await?;

    println!("File created with ID: {}", receipt.file_id);
    println!("Bytecode uploaded in {} chunks", receipt.chunks);
    println!("Contract deployed with ID: {}", receipt.contract_id);
    println!("Contract address: {}", receipt.address);
    Ok(())
}
