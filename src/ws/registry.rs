use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::connection::{Connection, ConnectionId};
use crate::models::UserId;

/// Outcome of removing a connection from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The connection was not tracked.
    NotPresent,
    /// Removed; the user still has this many connections.
    Remaining(usize),
    /// Removed the user's last connection.
    LastConnection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub unique_users: usize,
}

/// Live connections per user.
///
/// A user key exists only while it maps to at least one connection. Only the
/// hub loop mutates the map; everyone else takes short read-locked snapshots
/// and never writes to the network while holding the lock.
#[derive(Default)]
pub struct ConnectionRegistry {
    users: RwLock<HashMap<UserId, HashMap<ConnectionId, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection. Returns `false` when it was already tracked.
    pub async fn insert(&self, conn: Arc<Connection>) -> bool {
        let mut users = self.users.write().await;
        users
            .entry(conn.user_id())
            .or_default()
            .insert(conn.id(), conn)
            .is_none()
    }

    pub async fn remove(&self, conn: &Connection) -> Removal {
        let mut users = self.users.write().await;
        let Some(connections) = users.get_mut(&conn.user_id()) else {
            return Removal::NotPresent;
        };
        if connections.remove(&conn.id()).is_none() {
            return Removal::NotPresent;
        }
        if connections.is_empty() {
            users.remove(&conn.user_id());
            Removal::LastConnection
        } else {
            Removal::Remaining(connections.len())
        }
    }

    pub async fn has_connections(&self, user_id: UserId) -> bool {
        self.users.read().await.contains_key(&user_id)
    }

    pub async fn connection_count(&self, user_id: UserId) -> usize {
        self.users
            .read()
            .await
            .get(&user_id)
            .map_or(0, |connections| connections.len())
    }

    pub async fn snapshot_all(&self) -> Vec<Arc<Connection>> {
        self.users
            .read()
            .await
            .values()
            .flat_map(|connections| connections.values().cloned())
            .collect()
    }

    pub async fn snapshot_users(&self, user_ids: &[UserId]) -> Vec<Arc<Connection>> {
        let users = self.users.read().await;
        user_ids
            .iter()
            .filter_map(|user_id| users.get(user_id))
            .flat_map(|connections| connections.values().cloned())
            .collect()
    }

    /// Online users in ascending id order.
    pub async fn online_users(&self) -> Vec<UserId> {
        let mut online: Vec<UserId> = self.users.read().await.keys().copied().collect();
        online.sort_unstable();
        online
    }

    pub async fn stats(&self) -> RegistryStats {
        let users = self.users.read().await;
        RegistryStats {
            total_connections: users.values().map(|connections| connections.len()).sum(),
            unique_users: users.len(),
        }
    }

    /// Remove and return every connection.
    pub async fn drain(&self) -> Vec<Arc<Connection>> {
        let mut users = self.users.write().await;
        users
            .drain()
            .flat_map(|(_, connections)| connections.into_values())
            .collect()
    }
}
