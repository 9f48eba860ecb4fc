//! Error types for the relay server
//!
//! Defines application-level errors, wire protocol errors and
//! outbound delivery errors. Uses thiserror for ergonomic error definitions.

use std::net::SocketAddr;

use thiserror::Error;

/// Application-level errors
///
/// Only `Bind` is fatal to the server as a whole; everything else ends
/// at most a single session.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on a connection (fatal for that session)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Listening socket could not be bound (fatal at startup)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Channel send error (fatal - registry actor is gone)
    #[error("Channel send error")]
    ChannelSend,

    /// Outbound queue rejected a frame
    #[error("Send error: {0}")]
    Send(#[from] SendError),

    /// Malformed frame
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Wire protocol errors
///
/// Always recoverable: the offending frame is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame carried no text at all
    #[error("empty frame")]
    Empty,

    /// Bytes are not valid UTF-16LE
    #[error("frame is not valid UTF-16")]
    InvalidEncoding,

    /// Not enough `|` fields for the resolved frame kind
    #[error("{kind} frame needs {expected} fields, got {found}")]
    MissingField {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    /// Presence state token not recognised
    #[error("unknown presence state: {0:?}")]
    UnknownState(String),

    /// Name is empty, reserved or contains a delimiter
    #[error("invalid user name: {0:?}")]
    InvalidName(String),
}

/// Message send errors
///
/// Occurs when pushing bytes onto a connection's outbound queue.
#[derive(Debug, Error)]
pub enum SendError {
    /// The writer side of the connection has gone away
    #[error("Channel closed")]
    ChannelClosed,

    /// The peer is not draining its queue
    #[error("Outbound queue full")]
    QueueFull,
}
