use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::services::UserId;
use crate::ws::ConnectionId;

/// Registry entry for one connected user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistryEntry {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    /// Proximity radius in meters, already resolved against the default
    pub proximity_radius: f64,
}

/// Process-wide map of connected users.
///
/// At most one entry per user: registering again replaces the old entry and
/// hands it back so the caller can close the superseded connection.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn register(&self, entry: RegistryEntry) -> Option<RegistryEntry>;

    async fn lookup(&self, user_id: UserId) -> Option<RegistryEntry>;

    /// Remove the user's entry only if it still belongs to `connection_id`.
    /// Returns whether an entry was removed.
    async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool;

    async fn connected_count(&self) -> usize;
}

/// DashMap-backed [`ConnectionRegistry`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionRegistry {
    entries: Arc<DashMap<UserId, RegistryEntry>>,
}

impl MemoryConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionRegistry for MemoryConnectionRegistry {
    async fn register(&self, entry: RegistryEntry) -> Option<RegistryEntry> {
        let previous = self.entries.insert(entry.user_id, entry);

        tracing::debug!(
            user_id = entry.user_id,
            connection_id = %entry.connection_id,
            radius = entry.proximity_radius,
            superseded = previous.is_some(),
            "Connection registered"
        );
        previous.filter(|old| old.connection_id != entry.connection_id)
    }

    async fn lookup(&self, user_id: UserId) -> Option<RegistryEntry> {
        self.entries.get(&user_id).map(|e| *e.value())
    }

    async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let removed = self
            .entries
            .remove_if(&user_id, |_, entry| entry.connection_id == connection_id)
            .is_some();

        tracing::debug!(
            user_id = user_id,
            connection_id = %connection_id,
            removed,
            "Connection unregistered"
        );
        removed
    }

    async fn connected_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry(user_id: UserId) -> RegistryEntry {
        RegistryEntry {
            user_id,
            connection_id: Uuid::new_v4(),
            proximity_radius: 1600.0,
        }
    }

    #[tokio::test]
    async fn test_second_registration_supersedes_first() {
        let registry = MemoryConnectionRegistry::new();
        let first = entry(1);
        let second = entry(1);

        assert_eq!(registry.register(first).await, None);
        assert_eq!(registry.register(second).await, Some(first));
        assert_eq!(registry.lookup(1).await, Some(second));
        assert_eq!(registry.connected_count().await, 1);
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_newer_entry() {
        let registry = MemoryConnectionRegistry::new();
        let first = entry(1);
        let second = entry(1);
        registry.register(first).await;
        registry.register(second).await;

        assert!(!registry.unregister(1, first.connection_id).await);
        assert_eq!(registry.lookup(1).await, Some(second));

        assert!(registry.unregister(1, second.connection_id).await);
        assert_eq!(registry.lookup(1).await, None);
    }
}
