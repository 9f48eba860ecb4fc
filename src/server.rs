//! ChatServer Actor implementation
//!
//! The single owner of the user registry. Sessions never touch the registry
//! directly; they send `ServerCommand`s and the actor applies them one at a
//! time, so register/remove/lookup are linearizable without locks.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::presence;
use crate::registry::UserRegistry;
use crate::types::{ConnectionId, PresenceState};

/// Commands sent from sessions (and the server handle) to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Claim a name; replies whether the registration succeeded
    Register {
        name: String,
        connection: Connection,
        reply: oneshot::Sender<bool>,
    },
    /// Connection closed; removes its entry if it had one
    Disconnect { connection_id: ConnectionId },
    /// Forward a raw frame to the named user
    Relay { recipient: String, frame: Bytes },
    /// Liveness confirmed for a connection
    Heartbeat { connection_id: ConnectionId },
    /// Snapshot of registered names
    ListUsers { reply: oneshot::Sender<Vec<String>> },
    /// Forget every registered user (server stop)
    Clear,
}

/// The main ChatServer actor
pub struct ChatServer {
    /// Registered users: name -> connection
    registry: UserRegistry,
    /// Display name carried in presence updates
    server_name: String,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, server_name: impl Into<String>) -> Self {
        Self {
            registry: UserRegistry::new(),
            server_name: server_name.into(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Register {
                name,
                connection,
                reply,
            } => {
                let registered = self.handle_register(name, connection);
                let _ = reply.send(registered);
            }
            ServerCommand::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }
            ServerCommand::Relay { recipient, frame } => {
                self.handle_relay(&recipient, frame);
            }
            ServerCommand::Heartbeat { connection_id } => {
                debug!("Heartbeat from {}", connection_id);
            }
            ServerCommand::ListUsers { reply } => {
                let _ = reply.send(self.registry.names());
            }
            ServerCommand::Clear => {
                info!("Clearing {} registered users", self.registry.len());
                self.registry.clear();
            }
        }
    }

    /// Handle a registration attempt
    fn handle_register(&mut self, name: String, connection: Connection) -> bool {
        let connection_id = connection.id;
        if !self.registry.try_register(&name, connection) {
            info!("Name '{}' already taken, rejecting {}", name, connection_id);
            return false;
        }

        info!("User '{}' registered on {}", name, connection_id);
        presence::broadcast(
            &self.registry,
            &self.server_name,
            &name,
            PresenceState::Connected,
        );
        debug!("Total users: {}", self.registry.len());
        true
    }

    /// Handle connection close
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let Some(name) = self.registry.remove(connection_id) else {
            debug!("Disconnect for unregistered connection {}", connection_id);
            return;
        };

        info!("User '{}' disconnected", name);
        presence::broadcast(
            &self.registry,
            &self.server_name,
            &name,
            PresenceState::Disconnected,
        );
        debug!("Total users: {}", self.registry.len());
    }

    /// Handle relay: forward the bytes untouched, drop on lookup miss
    fn handle_relay(&self, recipient: &str, frame: Bytes) {
        let Some(connection) = self.registry.lookup(recipient) else {
            debug!("Relay to unknown user '{}' dropped", recipient);
            return;
        };

        if let Err(e) = connection.try_send(frame) {
            warn!("Relay to '{}' dropped: {}", recipient, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_text, Frame};

    fn test_addr() -> std::net::SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn spawn_server() -> mpsc::Sender<ServerCommand> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(ChatServer::new(rx, "Test").run());
        tx
    }

    async fn register(tx: &mpsc::Sender<ServerCommand>, name: &str, connection: Connection) -> bool {
        let (reply, rx) = oneshot::channel();
        tx.send(ServerCommand::Register {
            name: name.to_string(),
            connection,
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap()
    }

    async fn users(tx: &mpsc::Sender<ServerCommand>) -> Vec<String> {
        let (reply, rx) = oneshot::channel();
        tx.send(ServerCommand::ListUsers { reply }).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_register_broadcasts_connected() {
        let tx = spawn_server();
        let (alice, mut alice_rx) = Connection::channel(test_addr());

        assert!(register(&tx, "alice", alice).await);

        let frame = Frame::decode(&alice_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame.to_text().unwrap(), "MESSAGE|SERVER||alice|CONNECTED|Test");
    }

    #[tokio::test]
    async fn test_duplicate_register_rejected() {
        let tx = spawn_server();
        let (first, _rx1) = Connection::channel(test_addr());
        let (second, mut rx2) = Connection::channel(test_addr());

        assert!(register(&tx, "alice", first).await);
        assert!(!register(&tx, "alice", second).await);
        assert_eq!(users(&tx).await, vec!["alice"]);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_name_single_winner() {
        let tx = spawn_server();

        let attempts: Vec<_> = (0..64)
            .map(|_| {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let (conn, rx) = Connection::channel(test_addr());
                    let won = register(&tx, "alice", conn).await;
                    // Keep the queue open until every attempt has settled
                    (won, rx)
                })
            })
            .collect();

        let mut receivers = Vec::new();
        let mut winners = 0;
        for attempt in attempts {
            let (won, rx) = attempt.await.unwrap();
            if won {
                winners += 1;
            }
            receivers.push(rx);
        }

        assert_eq!(winners, 1);
        assert_eq!(users(&tx).await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_relay_forwards_exact_bytes() {
        let tx = spawn_server();
        let (bob, mut bob_rx) = Connection::channel(test_addr());
        register(&tx, "bob", bob).await;
        bob_rx.recv().await.unwrap();

        let raw = encode_text("MESSAGE|bob|hello");
        tx.send(ServerCommand::Relay {
            recipient: "bob".into(),
            frame: raw.clone(),
        })
        .await
        .unwrap();

        assert_eq!(bob_rx.recv().await.unwrap(), raw);
    }

    #[tokio::test]
    async fn test_disconnect_removes_and_notifies() {
        let tx = spawn_server();
        let (alice, _alice_rx) = Connection::channel(test_addr());
        let (bob, mut bob_rx) = Connection::channel(test_addr());
        let alice_id = alice.id;

        register(&tx, "alice", alice).await;
        register(&tx, "bob", bob).await;
        bob_rx.recv().await.unwrap();

        tx.send(ServerCommand::Disconnect { connection_id: alice_id })
            .await
            .unwrap();
        assert_eq!(users(&tx).await, vec!["bob"]);

        let frame = Frame::decode(&bob_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame.to_text().unwrap(), "MESSAGE|SERVER||alice|DISCONNECTED|Test");

        // Second disconnect is a no-op
        tx.send(ServerCommand::Disconnect { connection_id: alice_id })
            .await
            .unwrap();
        assert_eq!(users(&tx).await, vec!["bob"]);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear() {
        let tx = spawn_server();
        let (alice, _rx) = Connection::channel(test_addr());
        register(&tx, "alice", alice).await;

        tx.send(ServerCommand::Clear).await.unwrap();
        assert!(users(&tx).await.is_empty());
    }
}
