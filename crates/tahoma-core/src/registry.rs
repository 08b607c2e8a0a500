// ── Connection registry ──
//
// Keyed lookup of live connections for components that only know a box
// key from their own configuration. Injected where needed, never global.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::connection::Connection;

const CHANGE_CHANNEL_SIZE: usize = 64;

/// Registry membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Added(String),
    Removed(String),
}

impl RegistryChange {
    pub fn key(&self) -> &str {
        match self {
            Self::Added(key) | Self::Removed(key) => key,
        }
    }
}

/// Connections by key, with a change feed.
///
/// Removing a connection does not close it; the owner decides that.
pub struct ConnectionRegistry {
    connections: DashMap<String, Connection>,
    changes: broadcast::Sender<RegistryChange>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            connections: DashMap::new(),
            changes,
        }
    }

    /// Register `connection` under `key`, returning the one it replaced.
    pub fn add(&self, key: impl Into<String>, connection: Connection) -> Option<Connection> {
        let key = key.into();
        let previous = self.connections.insert(key.clone(), connection);
        debug!(key = %key, replaced = previous.is_some(), "connection registered");
        let _ = self.changes.send(RegistryChange::Added(key));
        previous
    }

    pub fn remove(&self, key: &str) -> Option<Connection> {
        let (key, connection) = self.connections.remove(key)?;
        debug!(key = %key, "connection unregistered");
        let _ = self.changes.send(RegistryChange::Removed(key));
        Some(connection)
    }

    pub fn get(&self, key: &str) -> Option<Connection> {
        self.connections.get(key).map(|c| c.value().clone())
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.connections.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::ConnectionConfig;

    fn connection() -> Connection {
        Connection::new(ConnectionConfig::new(
            "me@example.com",
            SecretString::from("pw".to_owned()),
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn add_get_remove_notify_in_order() {
        let registry = ConnectionRegistry::new();
        let mut changes = registry.subscribe();

        assert!(registry.add("box-1", connection()).is_none());
        assert!(registry.get("box-1").is_some());
        assert_eq!(registry.keys(), vec!["box-1".to_owned()]);

        let removed = registry.remove("box-1").unwrap();
        assert!(!removed.is_closed());
        assert!(registry.is_empty());

        assert_eq!(changes.recv().await.unwrap(), RegistryChange::Added("box-1".into()));
        assert_eq!(changes.recv().await.unwrap(), RegistryChange::Removed("box-1".into()));
    }

    #[tokio::test]
    async fn removing_unknown_key_is_silent() {
        let registry = ConnectionRegistry::new();
        let mut changes = registry.subscribe();

        assert!(registry.remove("nope").is_none());
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn add_replaces_existing() {
        let registry = ConnectionRegistry::new();
        registry.add("box-1", connection());
        assert!(registry.add("box-1", connection()).is_some());
        assert_eq!(registry.len(), 1);
    }
}
