use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pulsefs_server::{Server, ServerConfig};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Command line arguments for a PulseFS cluster member
#[derive(Parser, Debug)]
#[command(name = "pulsed")]
#[command(about = "Replicated hierarchical coordination store with an HTTP/JSON interface")]
struct Args {
    /// HTTP listen port
    #[arg(long)]
    port: u16,

    /// Peer-RPC listen address (host:port); doubles as this server's
    /// cluster identity
    #[arg(long)]
    addr: String,

    /// Address of an existing cluster member to join
    #[arg(long)]
    join: Option<String>,

    /// Election, liveness, and forwarding timeout in seconds
    #[arg(long, default_value_t = 3)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulsefs_server=debug,pulsefs_core=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = Server::spawn(ServerConfig {
        port: args.port,
        addr: args.addr,
        join: args.join,
        timeout: Duration::from_secs(args.timeout.max(1)),
        data_root: PathBuf::from("."),
    })
    .await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    server.shutdown().await;
    Ok(())
}
