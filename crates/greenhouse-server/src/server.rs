//! TCP server: accept loop plus the periodic publisher.
//!
//! # Architecture
//!
//! ```text
//! accept task ──spawn──► Session (reader) ──► Router ──► writer task ──► socket
//!                                   │                        ▲
//!                                   ▼                        │
//!                              NodeRegistry ◄── Publisher ───┘
//! ```
//!
//! [`ServerHandle::shutdown`] stops the accept loop and the publisher at their
//! next wait. Sessions already running are left to finish on their own.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::publisher::Publisher;
use crate::registry::NodeRegistry;
use crate::router::Router;
use crate::session::Session;

/// A bound greenhouse server, ready to [`run`](Self::run).
pub struct GreenhouseServer {
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<NodeRegistry>,
    router: Arc<Router>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Stops a running server from another task.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Ask the server to stop accepting connections and publishing.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl GreenhouseServer {
    /// Bind the listener described by `config`.
    pub async fn bind(config: ServerConfig, registry: Arc<NodeRegistry>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let router = Arc::new(Router::new(config.outbound_queue));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            listener,
            config,
            registry,
            router,
            shutdown: Arc::new(shutdown),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared node registry.
    pub fn registry(&self) -> Arc<NodeRegistry> {
        Arc::clone(&self.registry)
    }

    /// Shared session router.
    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    /// Handle for stopping the server.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Accept connections until shutdown.
    ///
    /// A failing `accept` is fatal to the loop and returned; sessions that are
    /// already running keep going.
    pub async fn run(self) -> Result<()> {
        let local_addr = self.local_addr()?;
        info!("Greenhouse listening on {}", local_addr);

        let publisher = Publisher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.router),
            self.config.publish_interval,
        );
        let publisher = tokio::spawn(publisher.run(self.shutdown.subscribe()));

        let mut shutdown = self.shutdown.subscribe();
        let result = loop {
            if *shutdown.borrow_and_update() {
                break Ok(());
            }

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Panel connected from {}", peer);
                        if let Err(e) = stream.set_nodelay(true) {
                            error!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }
                        tokio::spawn(Session::run(
                            stream,
                            peer.to_string(),
                            Arc::clone(&self.registry),
                            Arc::clone(&self.router),
                        ));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        break Err(e.into());
                    }
                },
                _ = shutdown.changed() => {}
            }
        };

        self.shutdown.send_replace(true);
        if let Err(e) = publisher.await {
            error!("Sensor publisher task failed: {}", e);
        }
        info!("Greenhouse on {} stopped accepting connections", local_addr);
        result
    }
}
