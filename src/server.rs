//! Server lifecycle: start, reachable URL, ordered shutdown.
//!
//! Connections are accepted here rather than through `axum::serve` so that
//! every connection task stays owned by the server and can be aborted when
//! the shutdown grace period runs out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::binder;
use crate::bridge::{CommandRunner, SystemRunner, TerminalBridge};
use crate::config::ServerConfig;
use crate::documents::DocumentSet;
use crate::error::ServerResult;
use crate::http_server;
use crate::state::AppState;

/// How long in-flight requests get after shutdown starts before their
/// connections are dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A running server. Dropping it without `stop` still shuts the listener
/// and kills any ttyd companion, but leaves grouped tmux sessions behind.
pub struct ServerHandle {
    url: String,
    addr: SocketAddr,
    bridge: Arc<TerminalBridge>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Tear down the bridge, stop accepting, close every connection, then
    /// release the listening socket. Returns once all of that is done.
    pub async fn stop(self) {
        self.bridge.teardown().await;

        // The receivers are gone if the accept loop already exited.
        let _ = self.shutdown.send(true);

        if let Err(err) = self.task.await {
            warn!(%err, "server task failed");
        }
        info!(url = %self.url, "server stopped");
    }
}

/// Start serving `config.documents` with the real process runner.
pub async fn start(config: ServerConfig) -> ServerResult<ServerHandle> {
    start_with_runner(config, Arc::new(SystemRunner)).await
}

/// Start with an explicit process runner for tmux and ttyd.
pub async fn start_with_runner(
    config: ServerConfig,
    runner: Arc<dyn CommandRunner>,
) -> ServerResult<ServerHandle> {
    let documents = DocumentSet::new(&config.documents)?;

    let bridge = TerminalBridge::new(config.tmux_pane.clone(), config.bridge.clone(), runner).await;
    if bridge.pane_id().is_some() && !bridge.is_interactive_terminal_available() {
        info!(
            program = %config.bridge.ttyd_program,
            "ttyd not found, interactive terminal disabled"
        );
    }

    let reserved = match &config.tmux_pane {
        Some(_) => vec![config.bridge.ttyd_port_base],
        None => Vec::new(),
    };
    let (listener, port) =
        binder::bind_with_fallback(config.host, config.port, &reserved, config.max_port_retries)
            .await?;
    let addr = listener.local_addr()?;
    let url = format!("http://localhost:{port}/");
    info!("Listening on {}", addr);

    let state = AppState::new(documents, bridge);
    let bridge = state.bridge.clone();
    let app = http_server::router(state);

    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(accept_loop(listener, app, shutdown_rx));

    Ok(ServerHandle {
        url,
        addr,
        bridge,
        shutdown,
        task,
    })
}

async fn accept_loop(listener: TcpListener, app: Router, mut shutdown: watch::Receiver<bool>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("listener received shutdown signal");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        app.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(err) => {
                    warn!(%err, "tcp accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            open = connections.len(),
            "connections still open after grace period, closing them"
        );
        connections.shutdown().await;
    }
    drop(listener);
}

/// Serve one HTTP/1 connection, finishing the current request and then
/// closing once shutdown is signalled.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) {
    let service = TowerToHyperService::new(app);
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    let result = loop {
        tokio::select! {
            result = conn.as_mut() => break result,
            _ = shutdown.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    };
    if let Err(err) = result {
        debug!(%peer, %err, "connection ended with error");
    }
}
