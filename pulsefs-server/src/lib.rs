//! # PulseFS Server
//!
//! A replicated, hierarchical coordination store with an HTTP/JSON
//! interface. Clients create and mutate a tree of directories and files by
//! path, subscribe to node changes via long-poll reads, and talk to any
//! member of a cluster that keeps one linearizable view of the tree through
//! ZAB-style atomic broadcast.
//!
//! The crate is a thin shell around [`pulsefs_core`]: the [`replication`]
//! engine totally orders writes and drives the deterministic tree, while
//! [`handlers`] maps HTTP verbs onto commands and long-poll watches.

/// Error types and HTTP status mapping
pub mod errors;

/// HTTP verb handlers
pub mod handlers;

/// Atomic broadcast engine and peer transport
pub mod replication;

/// Router assembly
pub mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use parking_lot::RwLock;
use pulsefs_core::log::CommandLog;
use pulsefs_core::tree::Tree;
use pulsefs_core::watch::WatchRegistry;
use tokio::net::TcpListener;
use tracing::{error, info};

use replication::{EngineConfig, EngineHandle};

/// Shared context threaded into every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The locally applied tree; written only by the replication engine.
    pub tree: Arc<RwLock<Tree>>,
    pub watches: Arc<WatchRegistry>,
    pub engine: EngineHandle,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Peer-RPC listen address; also this server's cluster identity.
    pub addr: String,
    /// Existing member to join, if any.
    pub join: Option<String>,
    /// Election / liveness / forwarding timeout.
    pub timeout: Duration,
    /// Parent of the per-server scratch directory (the directory itself is
    /// named by the server identity).
    pub data_root: PathBuf,
}

/// A running PulseFS member: HTTP front end plus replication engine.
#[derive(Debug)]
pub struct Server {
    pub id: String,
    pub http_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    pub data_dir: PathBuf,
    engine: EngineHandle,
    http_task: tokio::task::JoinHandle<()>,
}

impl Server {
    /// Bind both listeners, start the engine, and begin serving. Fails fast
    /// on bind errors so the process can exit non-zero.
    pub async fn spawn(config: ServerConfig) -> anyhow::Result<Server> {
        // the peer listener fixes our identity; an `:0` request adopts the
        // actual bound address so peers can dial back
        let peer_listener = TcpListener::bind(&config.addr)
            .await
            .with_context(|| format!("failed to bind peer listener on {}", config.addr))?;
        let peer_addr = peer_listener.local_addr()?;
        let id = if config.addr.ends_with(":0") {
            peer_addr.to_string()
        } else {
            config.addr.clone()
        };

        let data_dir = config.data_root.join(&id);
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let http_listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("failed to bind http listener on port {}", config.port))?;
        let http_addr = http_listener.local_addr()?;

        let tree = Arc::new(RwLock::new(Tree::new()));
        let watches = Arc::new(WatchRegistry::new());
        let log = Arc::new(CommandLog::new());

        let engine = replication::spawn(
            EngineConfig {
                id: id.clone(),
                join: config.join.clone(),
                timeout: config.timeout,
                data_dir: data_dir.clone(),
            },
            tree.clone(),
            watches.clone(),
            log,
            peer_listener,
        );

        let app = routes::create_app(AppState {
            tree,
            watches,
            engine: engine.clone(),
        });
        let http_task = tokio::spawn(async move {
            if let Err(err) = axum::serve(http_listener, app).await {
                error!(%err, "http server failed");
            }
        });

        info!(%id, http = %http_addr, peers = %peer_addr, "pulsefs member up");
        Ok(Server {
            id,
            http_addr,
            peer_addr,
            data_dir,
            engine,
            http_task,
        })
    }

    /// Base URL clients should use for this member.
    pub fn base_url(&self) -> String {
        if self.http_addr.ip().is_unspecified() {
            format!("http://127.0.0.1:{}", self.http_addr.port())
        } else {
            format!("http://{}", self.http_addr)
        }
    }

    /// Unregister from the cluster (best effort) and stop serving.
    pub async fn shutdown(self) {
        self.engine.shutdown().await;
        self.http_task.abort();
    }
}
