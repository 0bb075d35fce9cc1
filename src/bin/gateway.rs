//! Courier development gateway
//!
//! Serves an in-memory ledger over WebSocket so the other courier tools can
//! run end to end without network access. State lives only as long as the
//! process.
//!
//! Usage:
//!   courier-gateway [--port 8790] [--host 127.0.0.1] [--topic-memo courier]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use courier::ledger::{gateway, InMemoryLedger};
use tokio::net::TcpListener;
use tracing::info;

/// Courier development gateway
#[derive(Parser)]
#[command(name = "courier-gateway")]
#[command(about = "In-memory ledger served over WebSocket for local development")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8790")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Starting balance of the generated operator account
    #[arg(long, default_value = "100000000000")]
    balance: u64,

    /// Create a topic with this memo at startup
    #[arg(long)]
    topic_memo: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("courier_gateway=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let ledger = Arc::new(InMemoryLedger::new());
    let operator = ledger.create_operator(args.balance);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Courier gateway listening on ws://{}", addr);

    println!("export COURIER_GATEWAY_URL=ws://{addr}");
    println!("export COURIER_OPERATOR_ID={}", operator.account());
    println!("export COURIER_OPERATOR_KEY={}", operator.key().to_hex());
    if let Some(memo) = args.topic_memo {
        let topic = ledger.create_topic(&memo);
        println!("export COURIER_TOPIC_ID={topic}");
    }

    gateway::serve(listener, ledger).await;
    Ok(())
}
