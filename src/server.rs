//! TCP server for the honeypot.
//!
//! Accepts connections and hands each one to its own session task. Session
//! failures are logged and never reach the accept loop.

use crate::config::Config;
use crate::events::{EventSink, TracingSink};
use crate::protocols::mysql::handler::{handle_connection, SessionOptions};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    config: Config,
    options: SessionOptions,
    sink: Arc<dyn EventSink>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a server that reports session events to `sink`.
    pub fn with_sink(config: Config, sink: Arc<dyn EventSink>) -> Self {
        Server {
            options: SessionOptions::from(&config),
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            config,
            sink,
        }
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        let addr = tokio::net::lookup_host(&self.config.listen)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address for {}", self.config.listen),
                )
            })?;
        TcpListener::from_std(create_listener(addr)?)
    }

    /// Start the server and accept connections until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> io::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
        info!(address = %listener.local_addr()?, file = %self.options.file, "Server listening");

        loop {
            // Wait for a session slot
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.connection_limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let options = self.options.clone();
                    let sink = Arc::clone(&self.sink);
                    let shutdown = shutdown.child_token();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, options, sink, shutdown).await {
                            warn!(peer = %addr, error = %e, "Session ended with error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        info!("Server shutting down");
        Ok(())
    }
}

/// Create a TCP listener with SO_REUSEADDR so restarts can rebind at once.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
