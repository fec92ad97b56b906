//! `cctp-relayer`: relays Noble USDC burns to Solana.
//!
//! Reads the burn message from a Noble transaction (or takes it directly),
//! waits for Circle's attestation, then submits `receive_message` signed by a
//! local keypair.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use relayer_core::api::handlers::{router, AppState, HttpJsonRpcUpstream, JsonRpcUpstream};
use relayer_core::attestation::{poll_attestation, AttestationBytes, IrisAttestationClient};
use relayer_core::message::{domain_name, AttestedMessage};
use relayer_core::pipeline::RelayState;
use relayer_core::signer::KeypairSigner;
use relayer_core::utils::{decode_blob, message_hash_hex};
use relayer_core::{Relayer, RelayerConfig};
use relayer_noble::NobleTxReader;
use solana_sdk::signature::read_keypair_file;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cctp-relayer")]
#[command(about = "Relay CCTP burn messages from Noble to Solana")]
#[command(version)]
struct Cli {
    /// TOML config; mainnet defaults when omitted
    #[arg(long, global = true, env = "CCTP_RELAYER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MessageSource {
    /// Noble transaction hash containing the burn
    #[arg(long, conflicts_with = "message", required_unless_present = "message")]
    noble_tx: Option<String>,

    /// Raw message, hex or base64
    #[arg(long)]
    message: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the attestation and submit the mint
    Relay {
        #[command(flatten)]
        source: MessageSource,

        /// Solana keypair file that pays for and signs the relay
        #[arg(long)]
        keypair: PathBuf,

        /// Skip polling and use this attestation (hex or base64)
        #[arg(long)]
        attestation: Option<String>,
    },

    /// Poll for the attestation and print it
    Attest {
        #[command(flatten)]
        source: MessageSource,
    },

    /// Print the accounts a relay of this message would use
    Derive {
        #[command(flatten)]
        source: MessageSource,
    },

    /// Serve the blockhash/relay proxy
    Proxy {
        /// Overrides proxy.listen_address
        #[arg(long)]
        listen: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<RelayerConfig> {
    match path {
        Some(path) => {
            let path = path.to_str().ok_or_else(|| anyhow!("config path is not UTF-8"))?;
            RelayerConfig::load_from_file(path)
        }
        None => Ok(RelayerConfig::mainnet_defaults()),
    }
}

async fn load_message(config: &RelayerConfig, source: &MessageSource) -> Result<Vec<u8>> {
    if let Some(message) = &source.message {
        return decode_blob(message).context("failed to decode --message");
    }
    let tx_hash = source
        .noble_tx
        .as_deref()
        .ok_or_else(|| anyhow!("either --noble-tx or --message is required"))?;

    let reader = NobleTxReader::new(config.endpoints.noble_rest_url.clone(), config.http_timeout())?;
    reader
        .fetch_message(tx_hash)
        .await
        .with_context(|| format!("failed to read Noble transaction {tx_hash}"))
}

async fn fetch_attestation(config: &RelayerConfig, message: &[u8]) -> Result<AttestationBytes> {
    let parsed = AttestedMessage::parse(message)?;
    tracing::info!(
        "Waiting for attestation of {} -> {} nonce {} ({})",
        domain_name(parsed.source_domain),
        domain_name(parsed.destination_domain),
        parsed.nonce,
        message_hash_hex(message)
    );

    let client = IrisAttestationClient::new(config.endpoints.attestation_url.clone(), config.http_timeout())?;
    let attestation = poll_attestation(&client, parsed.hash(), &config.poll_policy()).await?;
    Ok(attestation)
}

async fn serve_proxy(config: &RelayerConfig, listen: Option<String>) -> Result<()> {
    let upstream = HttpJsonRpcUpstream::from_env(&config.proxy.upstream_rpc_env, config.http_timeout())
        .map(|u| Arc::new(u) as Arc<dyn JsonRpcUpstream>);
    if upstream.is_none() {
        tracing::warn!(
            "{} is not set; every proxy request will fail with 500",
            config.proxy.upstream_rpc_env
        );
    }

    let state = Arc::new(AppState {
        upstream,
        allowed_origins: config.proxy.allowed_origins.clone(),
    });

    let address = listen.unwrap_or_else(|| config.proxy.listen_address.clone());
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!("Proxy listening on {}", address);

    axum::serve(listener, router(state))
        .await
        .context("proxy server stopped")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Relay {
            source,
            keypair,
            attestation,
        } => {
            let keypair = read_keypair_file(&keypair)
                .map_err(|e| anyhow!("failed to read keypair {}: {}", keypair.display(), e))?;
            let signer = KeypairSigner::new(keypair);
            let relayer = Relayer::from_config(&config)?;

            let message = load_message(&config, &source).await?;
            let attestation = match attestation {
                Some(encoded) => AttestationBytes::from_encoded(&encoded)?,
                None => fetch_attestation(&config, &message).await?,
            };

            let report = relayer.relay(&message, &attestation, &signer).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.state == RelayState::Failed {
                bail!(
                    "relay failed: {}",
                    report.error.as_deref().unwrap_or("unknown error")
                );
            }
            if let Some(url) = &report.explorer_url {
                tracing::info!("View on Solscan: {}", url);
            }
        }

        Commands::Attest { source } => {
            let message = load_message(&config, &source).await?;
            let attestation = fetch_attestation(&config, &message).await?;
            println!("0x{}", hex::encode(attestation.as_bytes()));
        }

        Commands::Derive { source } => {
            let relayer = Relayer::from_config(&config)?;
            let message = load_message(&config, &source).await?;
            let (parsed, addresses) = relayer.prepare(&message)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "message_hash": message_hash_hex(parsed.as_bytes()),
                    "message": parsed,
                    "accounts": addresses,
                }))?
            );
        }

        Commands::Proxy { listen } => serve_proxy(&config, listen).await?,
    }

    Ok(())
}
