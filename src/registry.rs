//! User registry
//!
//! Name → connection directory. Owned by the `ChatServer` actor, so the
//! struct itself needs no locking: every access is serialized through the
//! actor's command queue.

use std::collections::{BTreeMap, HashMap};

use crate::connection::Connection;
use crate::types::ConnectionId;

/// Registered users
///
/// Names are unique and a connection appears under at most one name.
/// Iteration is in ascending name order.
#[derive(Debug, Default)]
pub struct UserRegistry {
    /// Name -> connection
    users: BTreeMap<String, Connection>,
    /// Connection -> name, for removal by connection
    names: HashMap<ConnectionId, String>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user
    ///
    /// Returns false (and changes nothing) if the name is taken or the
    /// connection is already registered.
    pub fn try_register(&mut self, name: &str, connection: Connection) -> bool {
        if self.users.contains_key(name) || self.names.contains_key(&connection.id) {
            return false;
        }
        self.names.insert(connection.id, name.to_string());
        self.users.insert(name.to_string(), connection);
        true
    }

    /// Remove whichever entry holds this connection
    ///
    /// Idempotent: an unknown connection returns None.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<String> {
        let name = self.names.remove(&connection_id)?;
        self.users.remove(&name);
        Some(name)
    }

    /// Find the connection registered under `name`
    pub fn lookup(&self, name: &str) -> Option<&Connection> {
        self.users.get(name)
    }

    /// All names except `name`, in ascending order
    pub fn snapshot_names_excluding(&self, name: &str) -> Vec<String> {
        self.users
            .keys()
            .filter(|n| n.as_str() != name)
            .cloned()
            .collect()
    }

    /// Every registered name, in ascending order
    pub fn names(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    /// Iterate `(name, connection)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Connection)> {
        self.users.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Drop every entry (server stop). Connections are not closed here.
    pub fn clear(&mut self) {
        self.users.clear();
        self.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn connection() -> (Connection, mpsc::Receiver<Bytes>) {
        Connection::channel("127.0.0.1:4000".parse().unwrap())
    }

    #[test]
    fn test_distinct_names_all_register() {
        let mut registry = UserRegistry::new();
        let mut ids = Vec::new();
        let mut _receivers = Vec::new();

        for name in ["alice", "bob", "carol", "dave"] {
            let (conn, rx) = connection();
            ids.push((name, conn.id));
            _receivers.push(rx);
            assert!(registry.try_register(name, conn));
        }

        assert_eq!(registry.len(), 4);
        for (name, id) in ids {
            assert_eq!(registry.lookup(name).map(|c| c.id), Some(id));
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = UserRegistry::new();
        let (first, _rx1) = connection();
        let (second, _rx2) = connection();
        let first_id = first.id;

        assert!(registry.try_register("alice", first));
        assert!(!registry.try_register("alice", second));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("alice").map(|c| c.id), Some(first_id));
    }

    #[test]
    fn test_connection_registers_once() {
        let mut registry = UserRegistry::new();
        let (conn, _rx) = connection();

        assert!(registry.try_register("alice", conn.clone()));
        assert!(!registry.try_register("alias", conn));
        assert!(registry.lookup("alias").is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = UserRegistry::new();
        let (conn, _rx) = connection();
        let id = conn.id;
        registry.try_register("alice", conn);

        assert_eq!(registry.remove(id), Some("alice".to_string()));
        assert!(registry.lookup("alice").is_none());
        assert_eq!(registry.remove(id), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_name_reusable_after_remove() {
        let mut registry = UserRegistry::new();
        let (old, _rx1) = connection();
        let (new, _rx2) = connection();
        let old_id = old.id;
        let new_id = new.id;

        registry.try_register("alice", old);
        registry.remove(old_id);
        assert!(registry.try_register("alice", new));
        assert_eq!(registry.lookup("alice").map(|c| c.id), Some(new_id));
    }

    #[test]
    fn test_snapshot_excludes_and_orders() {
        let mut registry = UserRegistry::new();
        let mut _receivers = Vec::new();
        for name in ["carol", "alice", "bob"] {
            let (conn, rx) = connection();
            _receivers.push(rx);
            registry.try_register(name, conn);
        }

        assert_eq!(registry.snapshot_names_excluding("bob"), vec!["alice", "carol"]);
        assert_eq!(registry.snapshot_names_excluding("nobody"), registry.names());
        assert_eq!(registry.names(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_clear() {
        let mut registry = UserRegistry::new();
        let (conn, _rx) = connection();
        let id = conn.id;
        registry.try_register("alice", conn);

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.remove(id), None);
    }
}
