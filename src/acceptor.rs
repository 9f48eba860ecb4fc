//! Connection acceptor
//!
//! Binds the listening socket, starts the registry actor and runs the
//! accept loop, spawning one session task per connection.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::server::{ChatServer, ServerCommand};
use crate::session::handle_connection;

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Entry point for starting a relay server
pub struct RelayServer;

impl RelayServer {
    /// Bind and launch; returns once the accept loop is running
    ///
    /// A bind failure is returned and nothing is left running.
    pub async fn start(config: ServerConfig) -> Result<ServerHandle, AppError> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AppError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!("Relay server '{}' listening on {}", config.server_name, local_addr);

        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        tokio::spawn(ChatServer::new(cmd_rx, config.server_name.clone()).run());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            cmd_tx.clone(),
            shutdown_rx,
            config.read_timeout(),
        ));

        Ok(ServerHandle {
            local_addr,
            cmd_tx,
            shutdown_tx,
            accept_task: Some(accept_task),
        })
    }
}

/// Handle to a running server
pub struct ServerHandle {
    local_addr: SocketAddr,
    cmd_tx: mpsc::Sender<ServerCommand>,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Names currently registered, in ascending order
    pub async fn users(&self) -> Result<Vec<String>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(ServerCommand::ListUsers { reply })
            .await
            .map_err(|_| AppError::ChannelSend)?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Stop accepting, clear the registry and release the listener
    ///
    /// Sessions already running are left alone and end through their own
    /// timeout or disconnect. Calling this more than once is harmless.
    pub async fn stop(&mut self) {
        let Some(accept_task) = self.accept_task.take() else {
            return;
        };
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = accept_task.await {
            error!("Accept loop ended abnormally: {}", e);
        }
        info!("Relay server on {} stopped", self.local_addr);
    }
}

async fn accept_loop(
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    mut shutdown: watch::Receiver<bool>,
    read_timeout: Duration,
) {
    loop {
        tokio::select! {
            // Also fires if the handle is dropped
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let cmd_tx = cmd_tx.clone();

                    // Spawn session task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, cmd_tx, read_timeout).await {
                            error!("Session for {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    drop(listener);
    let _ = cmd_tx.send(ServerCommand::Clear).await;
}
