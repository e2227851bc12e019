use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::models::{ChatId, UserId};

#[derive(Debug, Clone, Copy)]
struct TypingEntry {
    started_at: Instant,
    notify: Option<UserId>,
}

/// A typing indicator removed by the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredTyping {
    pub chat_id: ChatId,
    pub user_id: UserId,
    /// Who was told about the start; `None` means everyone was.
    pub notify: Option<UserId>,
}

/// Per (chat, user) typing state.
///
/// Entries leave the map exactly once, either through [`TypingTracker::stop`]
/// or [`TypingTracker::sweep`]; whichever removes the entry owns the single
/// "stopped typing" notification. Every `announce` callback runs while the
/// map is locked, so announcements for one (chat, user) are queued in the
/// same order as the state changes they describe.
pub struct TypingTracker {
    entries: Mutex<HashMap<(ChatId, UserId), TypingEntry>>,
    stale_after: Duration,
}

impl TypingTracker {
    pub fn new(stale_after: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), stale_after }
    }

    /// Record (or refresh) a typing start.
    pub async fn start(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        notify: Option<UserId>,
        announce: impl FnOnce(),
    ) {
        let mut entries = self.entries.lock().await;
        entries.insert((chat_id, user_id), TypingEntry { started_at: Instant::now(), notify });
        announce();
    }

    /// Remove an entry. `announce` gets its notify target, and only runs
    /// when something was removed.
    pub async fn stop(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        announce: impl FnOnce(Option<UserId>),
    ) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.remove(&(chat_id, user_id)) {
            Some(entry) => {
                announce(entry.notify);
                true
            }
            None => false,
        }
    }

    /// Remove every entry older than the staleness threshold.
    pub async fn sweep(&self, mut announce: impl FnMut(&ExpiredTyping)) -> Vec<ExpiredTyping> {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut entries = self.entries.lock().await;
        entries.retain(|(chat_id, user_id), entry| {
            if now.saturating_duration_since(entry.started_at) > self.stale_after {
                expired.push(ExpiredTyping {
                    chat_id: *chat_id,
                    user_id: *user_id,
                    notify: entry.notify,
                });
                false
            } else {
                true
            }
        });
        for entry in &expired {
            announce(entry);
        }
        expired
    }

    /// Users currently typing in a chat, excluding stale entries not yet swept.
    pub async fn typing_users(&self, chat_id: ChatId) -> Vec<UserId> {
        let now = Instant::now();
        let mut users: Vec<UserId> = self
            .entries
            .lock()
            .await
            .iter()
            .filter(|((chat, _), entry)| {
                *chat == chat_id
                    && now.saturating_duration_since(entry.started_at) <= self.stale_after
            })
            .map(|((_, user), _)| *user)
            .collect();
        users.sort_unstable();
        users
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
