//! Skein Setup Node -- single binary.
//!
//! Usage:
//!   skein-setup --config setup.toml        # Run the setup node
//!   skein-setup --config setup.toml check  # Validate config and identity

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use skein_setup::config::SetupConfig;
use skein_setup::discovery::Discovery;
use skein_setup::identity::NodeIdentity;
use skein_setup::metrics::NoopRecorder;
use skein_setup::node::SetupNode;
use skein_setup::quic_messenger::QuicMessenger;

#[derive(Parser)]
#[command(name = "skein-setup", about = "Skein route setup node")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "setup.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the setup node (default)
    Run,
    /// Validate the config file and key material, then exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = SetupConfig::load(Path::new(&cli.config))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("skein_setup={level},skein_routing={level}", level = cfg.log_level).into()
            }),
        )
        .init();

    match cli.command {
        Some(Commands::Check) => {
            let identity = identity_for(&cfg)?;
            println!("config ok, public key {}", identity.public_key());
            Ok(())
        }
        Some(Commands::Run) | None => run_node(cfg).await,
    }
}

fn identity_for(cfg: &SetupConfig) -> anyhow::Result<NodeIdentity> {
    let identity = NodeIdentity::from_seed(&cfg.seckey)?;
    anyhow::ensure!(
        identity.public_key() == cfg.pubkey,
        "configured pubkey {} does not match the secret key (derives {})",
        cfg.pubkey,
        identity.public_key()
    );
    Ok(identity)
}

async fn run_node(cfg: SetupConfig) -> anyhow::Result<()> {
    let identity = identity_for(&cfg)?;
    tracing::info!(
        pubkey = %cfg.pubkey,
        version = env!("CARGO_PKG_VERSION"),
        discovery = %cfg.messaging.discovery,
        server_count = cfg.messaging.server_count,
        listen = %cfg.network.listen_addr,
        "starting setup node"
    );

    let listen_addr: SocketAddr = cfg.network.listen_addr.parse()?;
    let discovery = Discovery::new(cfg.messaging.discovery.clone());
    let messenger = Arc::new(
        QuicMessenger::new(&identity, listen_addr, discovery)
            .await
            .map_err(|e| anyhow::anyhow!("messenger init failed: {e}"))?,
    );
    let node = SetupNode::new(messenger, Arc::new(NoopRecorder), cfg.messaging.server_count);

    let shutdown = CancellationToken::new();
    let serve_handle = {
        let node = node.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { node.serve(shutdown).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");
    shutdown.cancel();

    match serve_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("serve terminated with error: {e}"),
        Err(e) => tracing::warn!("serve task failed: {e}"),
    }
    node.close().await?;

    tracing::info!("shutdown complete");
    Ok(())
}
