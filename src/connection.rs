//! Connection handle
//!
//! A cheap, clonable handle onto one client's outbound queue. The session
//! owns the socket; whoever holds a `Connection` can only enqueue bytes.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{AppError, SendError};
use crate::protocol::Frame;
use crate::types::ConnectionId;

/// Outbound queue depth per connection
pub const OUTBOUND_BUFFER_SIZE: usize = 64;

/// Handle to a connected client
///
/// Holds the unique ID, the peer address and the Server → Client channel
/// drained by the connection's writer task.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Remote address
    pub peer: SocketAddr,
    /// Server → Client byte channel
    sender: mpsc::Sender<Bytes>,
}

impl Connection {
    /// Create a handle and the receiving end for its writer task
    pub fn channel(peer: SocketAddr) -> (Self, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
        let connection = Self {
            id: ConnectionId::new(),
            peer,
            sender,
        };
        (connection, receiver)
    }

    /// Queue raw bytes without waiting
    ///
    /// A full queue means the peer has stopped reading; the caller decides
    /// whether to drop or give up on the connection.
    pub fn try_send(&self, bytes: Bytes) -> Result<(), SendError> {
        self.sender.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Encode and queue a frame
    pub fn try_send_frame(&self, frame: &Frame) -> Result<(), AppError> {
        self.try_send(frame.encode()?)?;
        Ok(())
    }

    /// True once the writer task has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
