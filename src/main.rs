//! Meson Relayer - cross-chain swap status and authorization tooling
//!
//! Decodes swap identifiers, signs swap requests and releases, reconciles swap
//! status across origin and destination chains, and monitors the configured
//! networks.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethers::types::{Address, Bytes};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use meson_relayer::config::{QuorumConfig, Settings};
use meson_relayer::metrics::MetricsServer;
use meson_relayer::signer::SwapSigner;
use meson_relayer::{
    ClientRegistry, EncodedSwap, NetworkPreset, NetworkRegistry, ResilientProvider, SignerSlot,
    SwapStatusCoordinator,
};

/// Meson relayer
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (overrides MESON_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the fields packed into an encoded swap
    Decode { encoded: String },
    /// Reconcile a swap's status on its origin and destination chains
    Status {
        encoded: String,
        /// Initiator used for the destination lookup
        #[arg(long)]
        initiator: Option<String>,
    },
    /// Print recommended fees for a network
    Fees { network: String },
    /// Sign a swap request, or its release when a recipient is given
    Sign {
        encoded: String,
        /// Hex-encoded recipient on the destination chain
        #[arg(long)]
        recipient: Option<String>,
    },
    /// Connect every configured network and monitor it until shutdown
    Serve {
        #[arg(long, default_value_t = 30)]
        health_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let settings = match cli.config {
        Some(ref path) => Settings::from_path(path)?,
        None => Settings::load()?,
    };
    let networks = Arc::new(NetworkRegistry::builtin(settings.relayer.testnet)?);

    match cli.command {
        Command::Decode { encoded } => decode(&encoded),
        Command::Status { encoded, initiator } => {
            let initiator = initiator
                .map(|a| a.parse::<Address>())
                .transpose()
                .map_err(|e| anyhow::anyhow!("Invalid initiator address: {}", e))?;
            status(&settings, networks, &encoded, initiator).await
        }
        Command::Fees { network } => fees(&settings, &networks, &network).await,
        Command::Sign { encoded, recipient } => {
            let recipient = recipient
                .map(|r| r.parse::<Bytes>())
                .transpose()
                .map_err(|e| anyhow::anyhow!("Invalid recipient: {}", e))?;
            sign(&settings, &encoded, recipient).await
        }
        Command::Serve {
            health_interval_secs,
        } => serve(&settings, &networks, Duration::from_secs(health_interval_secs)).await,
    }
}

fn decode(encoded: &str) -> Result<()> {
    let encoded: EncodedSwap = encoded.parse()?;
    let request = meson_relayer::swap::decode(&encoded)?;

    println!("version:   {:?}", request.version);
    println!("amount:    {}", request.amount);
    println!("salt:      {}", request.salt);
    println!("fee:       {}", request.fee);
    println!("expire_ts: {}", request.expire_ts);
    println!("in:        0x{:04x} token {}", request.in_chain, request.in_token);
    println!("out:       0x{:04x} token {}", request.out_chain, request.out_token);
    Ok(())
}

/// Quorum from the settings, or the preset's public RPC as a single endpoint
fn quorum_for(settings: &Settings, preset: &NetworkPreset) -> Result<QuorumConfig> {
    if let Some(quorum) = settings.network(&preset.id) {
        return Ok(quorum.clone());
    }
    let url = preset
        .url
        .as_ref()
        .with_context(|| format!("No RPC configured for network {}", preset.id))?;
    Ok(QuorumConfig::single(url.clone()))
}

async fn status(
    settings: &Settings,
    networks: Arc<NetworkRegistry>,
    encoded: &str,
    initiator: Option<Address>,
) -> Result<()> {
    let encoded: EncodedSwap = encoded.parse()?;
    let clients = Arc::new(ClientRegistry::new());

    for coin_type in [encoded.in_chain(), encoded.out_chain()] {
        let preset = networks
            .by_short_coin_type(coin_type)
            .with_context(|| format!("Unsupported network 0x{:04x}", coin_type))?;
        let quorum = quorum_for(settings, preset)?;
        clients
            .connect(preset, &quorum, &settings.provider, None)
            .await?;
    }

    let coordinator = SwapStatusCoordinator::new(networks, clients.clone());
    let result = coordinator.check_swap_status(&encoded, initiator).await;
    clients.dispose_all().await;

    let status = result?;
    println!("posted: {}", status.posted.status);
    if let Some(initiator) = status.posted.initiator {
        println!("  initiator: {:?}", initiator);
    }
    if let Some(provider) = status.posted.provider {
        println!("  provider:  {:?}", provider);
    }
    match status.locked {
        Some(locked) => {
            println!("locked: {}", locked.status);
            if let Some(until) = locked.until {
                println!("  until:     {}", until);
            }
        }
        None => println!("locked: unavailable"),
    }
    Ok(())
}

async fn fees(settings: &Settings, networks: &NetworkRegistry, network: &str) -> Result<()> {
    let preset = networks
        .get(network)
        .with_context(|| format!("Unknown network {}", network))?;
    let quorum = quorum_for(settings, preset)?;
    let provider = ResilientProvider::connect(&preset.id, &quorum, &settings.provider).await?;

    let fees = provider.fee_data().await?;
    println!("gas_price:                {:?}", fees.gas_price);
    println!("max_fee_per_gas:          {:?}", fees.max_fee_per_gas);
    println!("max_priority_fee_per_gas: {:?}", fees.max_priority_fee_per_gas);
    Ok(())
}

async fn sign(settings: &Settings, encoded: &str, recipient: Option<Bytes>) -> Result<()> {
    let encoded: EncodedSwap = encoded.parse()?;
    let signer = SignerSlot::from_config(&settings.signer)?;
    let testnet = settings.relayer.testnet;

    let signature = match recipient {
        Some(recipient) => {
            signer
                .sign_swap_release(&encoded, &recipient, testnet)
                .await?
        }
        None => signer.sign_swap_request(&encoded, testnet).await?,
    };

    println!("signer: {:?}", signer.address().await?);
    println!("r: {:?}", signature.r);
    println!("s: {:?}", signature.s);
    println!("v: {}", signature.v);
    Ok(())
}

async fn serve(settings: &Settings, networks: &NetworkRegistry, interval: Duration) -> Result<()> {
    info!("Starting Meson Relayer v{}", env!("CARGO_PKG_VERSION"));

    let clients = Arc::new(ClientRegistry::new());
    for (id, quorum) in &settings.networks {
        let Some(preset) = networks.get(id) else {
            warn!("Skipping network {} - no preset", id);
            continue;
        };
        match clients
            .connect(preset, quorum, &settings.provider, None)
            .await
        {
            Ok(_) => info!("Network {} initialized", id),
            Err(e) => error!("Failed to initialize network {}: {}", id, e),
        }
    }

    let metrics_handle = settings.metrics.enabled.then(|| {
        let server = MetricsServer::new(settings.metrics.port);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    let health_handle = tokio::spawn({
        let clients = clients.clone();
        let ids: Vec<String> = settings.networks.keys().cloned().collect();
        async move {
            loop {
                tokio::time::sleep(interval).await;
                for id in &ids {
                    if let Some(client) = clients.get(id) {
                        client.health_check().await;
                    }
                }
            }
        }
    });

    info!("Meson Relayer is running");
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    shutdown_signal().await;
    info!("Shutdown signal received, stopping...");

    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }
    clients.dispose_all().await;

    info!("Meson Relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,meson_relayer=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
