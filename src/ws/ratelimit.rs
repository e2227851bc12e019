use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::UserId;

/// Sliding-window message quota per user.
pub struct RateLimiter {
    max_messages: usize,
    window: Duration,
    windows: Mutex<HashMap<UserId, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_messages: usize, window: Duration) -> Self {
        Self { max_messages, window, windows: Mutex::new(HashMap::new()) }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one message for `user_id`. Returns `false` (and records nothing)
    /// when the user already sent `max_messages` within the window.
    pub async fn check_limit(&self, user_id: UserId) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let timestamps = windows.entry(user_id).or_default();
        prune(timestamps, now, self.window);

        if timestamps.len() >= self.max_messages {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Drop timestamps older than twice the window and forget idle users.
    /// Returns how many users were forgotten.
    pub async fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let retention = self.window * 2;
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, timestamps| {
            prune(timestamps, now, retention);
            !timestamps.is_empty()
        });
        before - windows.len()
    }

    pub async fn tracked_users(&self) -> usize {
        self.windows.lock().await.len()
    }

    /// Run [`RateLimiter::collect_garbage`] once per window until `shutdown` fires.
    pub fn spawn_gc(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.window);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Rate limiter cleanup stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let removed = self.collect_garbage().await;
                        if removed > 0 {
                            debug!(removed_users = removed, "Rate limiter garbage collected");
                        }
                    }
                }
            }
        })
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, keep: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= keep {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
