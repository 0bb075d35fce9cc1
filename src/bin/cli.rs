//! Courier CLI
//!
//! Encrypt messages, publish them to a ledger topic and watch the topic for
//! replies. Ledger access goes through a gateway (see `courier-gateway`).

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use courier::{
    crypto::{Keypair, KeyringManager, MessageCodec},
    ledger::{GatewayClient, InMemoryLedger, LedgerClient, LedgerLogClient},
    notary::ContractNotary,
    wallet::{Address, DevWallet, WalletProvider, WalletSession},
    Config, MessageExchangeController,
};
use tracing::info;

/// Courier: encrypted messages over a ledger topic
#[derive(Parser)]
#[command(name = "courier")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/courier/config.json, if present)
    #[arg(short, long, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an encryption keypair
    Keygen {
        /// Identity recorded in the key armor
        #[arg(long, default_value = "courier")]
        hint: String,

        /// Write the armored private key here; nothing is written otherwise
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Overwrite an existing key file
        #[arg(short, long)]
        force: bool,
    },

    /// Encrypt a message and publish it to the topic
    Send {
        /// Message text
        message: String,

        /// Armored private key file; a one-off keypair is used otherwise
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Also log the content hash on the notary contract
        #[arg(long)]
        notarize: bool,

        /// Sign notary calls with an auto-approving development wallet
        #[arg(long)]
        dev_wallet: bool,
    },

    /// Poll the topic and print incoming messages
    Watch {
        /// Armored private key file used to decrypt what arrives
        #[arg(short, long)]
        key: Option<PathBuf>,
    },

    /// Decrypt an armored ciphertext (from a file, or stdin)
    Decrypt {
        /// Armored private key file
        #[arg(short, long)]
        key: PathBuf,

        /// Ciphertext file; stdin if omitted
        input: Option<PathBuf>,
    },

    /// Run the whole flow offline against an in-memory ledger
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("courier=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| Config::default_path().filter(|p| p.exists()));

    match cli.command {
        Commands::Keygen { hint, out, force } => cmd_keygen(&hint, out.as_deref(), force),
        Commands::Send {
            message,
            key,
            notarize,
            dev_wallet,
        } => {
            let config = Config::load(config_path.as_deref())?;
            cmd_send(&config, &message, key.as_deref(), notarize, dev_wallet).await
        }
        Commands::Watch { key } => {
            let config = Config::load(config_path.as_deref())?;
            cmd_watch(&config, key.as_deref()).await
        }
        Commands::Decrypt { key, input } => cmd_decrypt(&key, input.as_deref()).await,
        Commands::Demo => cmd_demo().await,
    }
}

fn load_keypair(path: &Path) -> Result<Keypair> {
    let text = fs::read_to_string(path).with_context(|| format!("No key file at {}", path.display()))?;
    Keypair::from_private_armor(&text).with_context(|| format!("Invalid key file {}", path.display()))
}

async fn connect_gateway(config: &Config) -> Result<Arc<dyn LedgerClient>> {
    let gateway = GatewayClient::connect(&config.gateway_url)
        .await
        .with_context(|| format!("Cannot reach ledger gateway at {}", config.gateway_url))?;
    Ok(Arc::new(gateway))
}

fn cmd_keygen(hint: &str, out: Option<&Path>, force: bool) -> Result<()> {
    let mut keyring = KeyringManager::new();
    let keypair = keyring.generate_keypair(hint)?;

    if let Some(path) = out {
        if path.exists() && !force {
            bail!("{} already exists; use --force to overwrite", path.display());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, keypair.private_key())?;
        println!("Private key saved to: {}", path.display());
        println!();
    }

    println!("Fingerprint: {}", keypair.fingerprint());
    println!();
    println!("{}", keypair.public_key());
    Ok(())
}

async fn cmd_send(
    config: &Config,
    message: &str,
    key: Option<&Path>,
    notarize: bool,
    dev_wallet: bool,
) -> Result<()> {
    let provider: Option<Arc<dyn WalletProvider>> = if dev_wallet {
        Some(Arc::new(DevWallet::new()))
    } else {
        None
    };
    let controller = MessageExchangeController::from_config(config, connect_gateway(config).await?, provider)?;

    match key {
        Some(path) => {
            controller.install_keypair(load_keypair(path)?);
        }
        None => {
            let keypair = controller.generate_keypair("courier")?;
            println!("Using a one-off keypair ({}); it is not saved.", keypair.fingerprint());
        }
    }

    let drafted = controller.draft(message);
    let encrypted = controller.encrypt(drafted.id).await?;
    let receipt = controller.submit(drafted.id).await?;

    println!("Message {} published to topic {}", drafted.id, controller.topic_id());
    if let Some(seq) = receipt.topic_sequence_number {
        println!("Sequence number: {seq}");
    }
    println!("Consensus time: {}", receipt.consensus_timestamp);

    if notarize {
        let address = controller.connect_wallet().await?;
        info!(%address, "Wallet connected");
        let notarized = controller.notarize(drafted.id).await?;
        println!("Content hash {} logged in {}", notarized.content_hash, notarized.transaction_hash);
        controller.disconnect_wallet().await;
    }

    if let Some(ciphertext) = encrypted.ciphertext {
        println!();
        println!("{ciphertext}");
    }
    Ok(())
}

async fn cmd_watch(config: &Config, key: Option<&Path>) -> Result<()> {
    let controller = MessageExchangeController::from_config(config, connect_gateway(config).await?, None)?;
    if let Some(path) = key {
        controller.install_keypair(load_keypair(path)?);
    }

    controller.start_watching().await;
    println!("Watching topic {} (Ctrl-C to stop)", controller.topic_id());

    let mut printed = 0;
    let mut tick = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tick.tick() => {}
        }

        let received = controller.received();
        for entry in &received[printed..] {
            let seq = entry
                .sequence_number
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            let shown = match controller.decrypt_received(entry.observed_at).await {
                Ok(text) => text,
                Err(e) => format!("<{e}> {} bytes", entry.raw_contents.len()),
            };
            println!("[{seq}] {shown}");
        }
        printed = received.len();
    }

    controller.stop_watching().await;
    Ok(())
}

async fn cmd_decrypt(key: &Path, input: Option<&Path>) -> Result<()> {
    let keypair = load_keypair(key)?;
    let ciphertext = match input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let plaintext = MessageCodec::new().decrypt(&ciphertext, keypair.private_key()).await?;
    println!("{plaintext}");
    Ok(())
}

async fn cmd_demo() -> Result<()> {
    println!("=== Courier Demo ===");
    println!();

    let ledger = Arc::new(InMemoryLedger::new());
    let operator = ledger.create_operator(10_000_000_000);
    let topic = ledger.create_topic("courier demo");
    let wallet = Arc::new(DevWallet::new());
    let contract: Address = "0x00000000000000000000000000000000004c5748".parse()?;

    let log = LedgerLogClient::new(ledger.clone(), operator).with_poll_interval(Duration::from_millis(200));
    let controller = MessageExchangeController::new(log, topic, WalletSession::with_provider(wallet.clone()))
        .with_notary(ContractNotary::new(contract).with_receipt_polling(Duration::from_millis(50), Duration::from_secs(5)));

    println!("--- Step 1: Keypair ---");
    let keypair = controller.generate_keypair("demo")?;
    println!("Fingerprint: {}", keypair.fingerprint());
    println!();

    println!("--- Step 2: Wallet ---");
    let address = controller.connect_wallet().await?;
    println!("Connected account: {address}");
    println!("Watching topic {topic}");
    println!();

    println!("--- Step 3: Encrypt and publish ---");
    let drafted = controller.draft("hello");
    let encrypted = controller.encrypt(drafted.id).await?;
    let ciphertext = encrypted.ciphertext.unwrap_or_default();
    println!("Ciphertext is {} characters", ciphertext.len());
    let receipt = controller.submit(drafted.id).await?;
    println!("Published as sequence {:?}", receipt.topic_sequence_number);
    println!();

    println!("--- Step 4: Notarize ---");
    let notarized = controller.notarize(drafted.id).await?;
    println!("Hash {} logged by {}", notarized.content_hash, notarized.from);
    println!("Ciphertext matches logged hash: {}", notarized.verifies(&ciphertext));
    println!();

    println!("--- Step 5: Receive and decrypt ---");
    for _ in 0..50 {
        if !controller.received().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if controller.received().is_empty() {
        bail!("Published message was not observed on the topic");
    }
    println!("Decrypted: {}", controller.decrypt_received(0).await?);
    println!();

    controller.disconnect_wallet().await;
    println!("=== Demo Complete ===");
    Ok(())
}
