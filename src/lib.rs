//! Text Relay Server Library
//!
//! A TCP relay for pipe-delimited text frames. Clients connect, claim a
//! unique display name and send frames that the server routes to another
//! user by name. Joins and leaves are broadcast to everyone.
//!
//! # Features
//! - Name registration with uniqueness enforcement
//! - Verbatim relay of frames addressed to a registered user
//! - Presence broadcasts on connect/disconnect
//! - Heartbeat handling and read-inactivity timeout
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the user registry
//! - Each connection runs a `Session` task talking to the actor
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use text_relay_server::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut server = RelayServer::start(ServerConfig::default()).await.unwrap();
//!     tokio::signal::ctrl_c().await.unwrap();
//!     server.stop().await;
//! }
//! ```

pub mod acceptor;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use acceptor::{RelayServer, ServerHandle};
pub use codec::WireCodec;
pub use config::ServerConfig;
pub use connection::Connection;
pub use error::{AppError, ProtocolError, SendError};
pub use protocol::Frame;
pub use registry::UserRegistry;
pub use server::{ChatServer, ServerCommand};
pub use session::{handle_connection, Session, SessionState};
pub use types::{ConnectionId, PresenceState};
