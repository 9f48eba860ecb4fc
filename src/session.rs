//! Client session
//!
//! Owns one TCP connection from the first read to close:
//! `AwaitingName → Registered → Closed`. A read loop runs in the session's
//! own task while a writer task drains the connection's outbound queue.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::codec::WireCodec;
use crate::connection::Connection;
use crate::error::AppError;
use crate::protocol::{self, Frame};
use crate::server::ServerCommand;

/// How long queued output may take to flush after the read side ends
const WRITE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the registration frame
    AwaitingName,
    /// Name claimed, relaying frames
    Registered,
    /// Terminal
    Closed,
}

/// Per-connection state machine
#[derive(Debug)]
pub struct Session {
    connection: Connection,
    name: Option<String>,
    state: SessionState,
    cmd_tx: mpsc::Sender<ServerCommand>,
}

impl Session {
    pub fn new(connection: Connection, cmd_tx: mpsc::Sender<ServerCommand>) -> Self {
        Self {
            connection,
            name: None,
            state: SessionState::AwaitingName,
            cmd_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Registered name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Read frames until the peer goes away, goes quiet or gets refused
    ///
    /// Every read is bounded by `read_timeout`; expiry counts as a disconnect.
    pub async fn run<S>(&mut self, reader: &mut S, read_timeout: Duration) -> Result<(), AppError>
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Unpin,
    {
        let result = self.read_loop(reader, read_timeout).await;
        self.close().await;
        result
    }

    async fn read_loop<S>(&mut self, reader: &mut S, read_timeout: Duration) -> Result<(), AppError>
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Unpin,
    {
        while self.state != SessionState::Closed {
            let frame = match tokio::time::timeout(read_timeout, reader.next()).await {
                Err(_) => {
                    info!("Connection {} timed out", self.connection.id);
                    return Ok(());
                }
                Ok(None) => {
                    debug!("Connection {} closed by peer", self.connection.id);
                    return Ok(());
                }
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(frame))) => frame,
            };

            match self.state {
                SessionState::AwaitingName => self.register(frame).await?,
                SessionState::Registered => self.handle_frame(frame).await?,
                SessionState::Closed => break,
            }
        }
        Ok(())
    }

    /// First frame: claim a name or get refused
    async fn register(&mut self, frame: Bytes) -> Result<(), AppError> {
        let name = match protocol::parse_registration(&frame) {
            Ok(name) => name,
            Err(e) => {
                warn!("Connection {} sent invalid name: {}", self.connection.id, e);
                match protocol::decode_text(&frame) {
                    Ok(name) => self.refuse(name),
                    // Not text at all, nothing to echo back
                    Err(_) => self.state = SessionState::Closed,
                }
                return Ok(());
            }
        };

        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ServerCommand::Register {
                name: name.clone(),
                connection: self.connection.clone(),
                reply,
            })
            .await
            .map_err(|_| AppError::ChannelSend)?;

        if !reply_rx.await.map_err(|_| AppError::ChannelSend)? {
            self.refuse(name);
            return Ok(());
        }

        info!("Connection {} registered as '{}'", self.connection.id, name);
        self.name = Some(name);
        self.state = SessionState::Registered;
        Ok(())
    }

    /// Answer with NAME_EXIST and end without registering
    fn refuse(&mut self, name: String) {
        if let Err(e) = self.connection.try_send_frame(&Frame::NameConflict { name }) {
            warn!("Could not send name conflict to {}: {}", self.connection.id, e);
        }
        self.state = SessionState::Closed;
    }

    /// Dispatch one frame from a registered client
    async fn handle_frame(&mut self, raw: Bytes) -> Result<(), AppError> {
        let frame = match Frame::decode(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping frame from {}: {}", self.display_name(), e);
                return Ok(());
            }
        };

        let cmd = match frame {
            Frame::Heartbeat => {
                if self.connection.is_closed() {
                    info!("Heartbeat on dead connection {}", self.display_name());
                    self.close().await;
                    return Ok(());
                }
                ServerCommand::Heartbeat {
                    connection_id: self.connection.id,
                }
            }
            Frame::Message { recipient, .. } => {
                debug!("Relay {} -> '{}'", self.display_name(), recipient);
                ServerCommand::Relay {
                    recipient,
                    frame: raw,
                }
            }
            other => {
                warn!(
                    "Dropping {} frame from client {}",
                    other.kind(),
                    self.display_name()
                );
                return Ok(());
            }
        };

        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| AppError::ChannelSend)
    }

    /// Move to `Closed`, unregistering if needed. Safe to call repeatedly.
    pub async fn close(&mut self) {
        let was_registered = self.state == SessionState::Registered;
        self.state = SessionState::Closed;

        if was_registered {
            let _ = self
                .cmd_tx
                .send(ServerCommand::Disconnect {
                    connection_id: self.connection.id,
                })
                .await;
        }
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unregistered>")
    }
}

/// Handle a new TCP connection
///
/// Splits the stream, starts the writer task, runs the session read loop
/// and waits for queued output to flush before returning.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    read_timeout: Duration,
) -> Result<(), AppError> {
    let peer_addr = stream.peer_addr()?;
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, WireCodec::new());
    let mut writer = FramedWrite::new(write_half, WireCodec::new());

    let (connection, mut out_rx) = Connection::channel(peer_addr);
    let connection_id = connection.id;
    info!("Client {} connected from {}", connection_id, peer_addr);

    // Ends once every handle to the connection is dropped or a write fails
    let write_task = tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if let Err(e) = writer.send(bytes).await {
                debug!("Write to {} failed: {}", peer_addr, e);
                break;
            }
        }
        let _ = writer.close().await;
    });

    let mut session = Session::new(connection, cmd_tx);
    let result = session.run(&mut reader, read_timeout).await;
    info!(
        "Client {} ({}) disconnected",
        connection_id,
        session.name().unwrap_or("unregistered")
    );
    drop(session);

    finish_writer(write_task, WRITE_DRAIN_TIMEOUT).await;
    result
}

/// Wait for the writer to flush, aborting it if the peer stops reading
async fn finish_writer(mut write_task: JoinHandle<()>, limit: Duration) {
    if tokio::time::timeout(limit, &mut write_task).await.is_err() {
        debug!("Writer did not drain within {:?}, aborting", limit);
        write_task.abort();
    }
}
