use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{rfc3339, UserId, UserLastSeen};

/// Last-seen records for users that are fully offline.
///
/// The hub loop drives every transition: `mark_online` before a user's first
/// connection is tracked, `mark_offline` after the last one is gone. A user
/// therefore never has both live connections and a record here.
#[derive(Default)]
pub struct PresenceTracker {
    last_seen: RwLock<HashMap<UserId, DateTime<Utc>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_online(&self, user_id: UserId) {
        self.last_seen.write().await.remove(&user_id);
    }

    pub async fn mark_offline(&self, user_id: UserId, at: DateTime<Utc>) {
        self.last_seen.write().await.insert(user_id, at);
    }

    pub async fn last_seen(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.last_seen.read().await.get(&user_id).copied()
    }

    pub async fn len(&self) -> usize {
        self.last_seen.read().await.len()
    }

    /// All records in ascending user id order.
    pub async fn snapshot(&self) -> Vec<UserLastSeen> {
        let mut records: Vec<UserLastSeen> = self
            .last_seen
            .read()
            .await
            .iter()
            .map(|(user_id, at)| UserLastSeen { user_id: *user_id, last_seen: rfc3339(*at) })
            .collect();
        records.sort_unstable_by_key(|record| record.user_id);
        records
    }
}
