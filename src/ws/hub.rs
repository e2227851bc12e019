use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::presence::PresenceTracker;
use super::registry::{ConnectionRegistry, Removal};
use super::router::{self, BroadcastEnvelope};
use super::typing::TypingTracker;
use crate::config::Config;
use crate::models::{
    rfc3339, ChatId, ChatMessage, MessageId, OutboundEvent, OutboundFrame, PresenceStatus, UserId,
};

#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    pub typing_timeout: Duration,
    pub typing_sweep_interval: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            typing_timeout: Duration::from_secs(5),
            typing_sweep_interval: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for HubSettings {
    fn from(config: &Config) -> Self {
        Self {
            typing_timeout: config.typing_timeout(),
            typing_sweep_interval: config.typing_sweep_interval(),
        }
    }
}

/// Requests consumed by the hub loop, in submission order.
#[derive(Debug)]
enum HubCommand {
    Register(Arc<Connection>),
    Unregister(Arc<Connection>),
    Broadcast(BroadcastEnvelope),
    Sync(oneshot::Sender<()>),
}

struct HubState {
    registry: ConnectionRegistry,
    presence: PresenceTracker,
    typing: TypingTracker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub total_connections: usize,
    pub unique_users: usize,
    pub last_seen_records: usize,
    pub typing_entries: usize,
}

/// Handle to the chat hub. Cheap to clone.
///
/// Registration, unregistration and broadcasts are queued to a single loop
/// task ([`HubLoop`]), which is the only writer of connection and presence
/// state. Queries read that state directly.
#[derive(Clone)]
pub struct ChatHub {
    state: Arc<HubState>,
    commands: mpsc::UnboundedSender<HubCommand>,
    shutdown: CancellationToken,
    settings: HubSettings,
}

/// The single-writer event loop behind a [`ChatHub`].
pub struct HubLoop {
    state: Arc<HubState>,
    receiver: mpsc::UnboundedReceiver<HubCommand>,
    commands: mpsc::UnboundedSender<HubCommand>,
    shutdown: CancellationToken,
}

impl ChatHub {
    /// Build a hub and its loop without spawning anything.
    pub fn new(settings: HubSettings, shutdown: CancellationToken) -> (Self, HubLoop) {
        let state = Arc::new(HubState {
            registry: ConnectionRegistry::new(),
            presence: PresenceTracker::new(),
            typing: TypingTracker::new(settings.typing_timeout),
        });
        let (commands, receiver) = mpsc::unbounded_channel();

        let hub = Self {
            state: state.clone(),
            commands: commands.clone(),
            shutdown: shutdown.clone(),
            settings,
        };
        let event_loop = HubLoop { state, receiver, commands, shutdown };
        (hub, event_loop)
    }

    /// Build a hub and spawn its loop and typing sweeper.
    pub fn start(settings: HubSettings, shutdown: CancellationToken) -> Self {
        let (hub, event_loop) = Self::new(settings, shutdown);
        tokio::spawn(event_loop.run());
        hub.spawn_typing_sweeper();
        hub
    }

    fn submit(&self, command: HubCommand) {
        if self.commands.send(command).is_err() {
            debug!("Chat hub is not running, dropping command");
        }
    }

    pub fn register(&self, conn: Arc<Connection>) {
        self.submit(HubCommand::Register(conn));
    }

    pub fn unregister(&self, conn: Arc<Connection>) {
        self.submit(HubCommand::Unregister(conn));
    }

    pub fn broadcast(&self, envelope: BroadcastEnvelope) {
        self.submit(HubCommand::Broadcast(envelope));
    }

    /// Resolves once every command submitted before this call has been processed.
    pub async fn sync(&self) {
        let (done, processed) = oneshot::channel();
        self.submit(HubCommand::Sync(done));
        let _ = processed.await;
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn broadcast_new_message(&self, chat_id: ChatId, message: ChatMessage) {
        self.broadcast(BroadcastEnvelope::new(OutboundEvent::NewMessage { chat_id, message }));
    }

    pub fn broadcast_message_read(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        reader_id: UserId,
        targets: impl IntoIterator<Item = UserId>,
    ) {
        self.broadcast(
            BroadcastEnvelope::new(OutboundEvent::MessageRead {
                chat_id,
                message_id: Some(message_id),
                message_ids: Vec::new(),
                read_by: reader_id,
            })
            .to(targets),
        );
    }

    /// Batch read receipt, stamped with the time the messages were read.
    pub fn broadcast_messages_read(
        &self,
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
        reader_id: UserId,
        read_at: DateTime<Utc>,
        targets: impl IntoIterator<Item = UserId>,
    ) {
        let event = OutboundEvent::MessageRead {
            chat_id,
            message_id: None,
            message_ids,
            read_by: reader_id,
        };
        self.broadcast(BroadcastEnvelope::from_frame(OutboundFrame::at(event, read_at)).to(targets));
    }

    pub fn broadcast_message_delivered(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        delivered_at: DateTime<Utc>,
        targets: impl IntoIterator<Item = UserId>,
    ) {
        self.broadcast(
            BroadcastEnvelope::new(OutboundEvent::MessageDelivered {
                chat_id,
                message_id,
                delivered_at: rfc3339(delivered_at),
            })
            .to(targets),
        );
    }

    /// Typing indicator for everyone. Only used when no participant lookup exists.
    pub fn broadcast_typing(&self, chat_id: ChatId, user_id: UserId, is_typing: bool) {
        self.broadcast_typing_event(chat_id, user_id, is_typing, None);
    }

    pub fn broadcast_typing_to_user(
        &self,
        chat_id: ChatId,
        typer_id: UserId,
        target_user_id: UserId,
        is_typing: bool,
    ) {
        self.broadcast_typing_event(chat_id, typer_id, is_typing, Some(target_user_id));
    }

    fn broadcast_typing_event(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        is_typing: bool,
        target: Option<UserId>,
    ) {
        self.broadcast(
            BroadcastEnvelope::new(OutboundEvent::UserTyping { chat_id, user_id, is_typing })
                .to(target),
        );
    }

    /// Track a typing start or stop and notify `target` (everyone when `None`).
    ///
    /// A stop for an indicator that is no longer tracked emits nothing: the
    /// sweeper already sent the stop event for it.
    pub async fn set_user_typing(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        is_typing: bool,
        target: Option<UserId>,
    ) {
        let typing = &self.state.typing;
        if is_typing {
            typing
                .start(chat_id, user_id, target, || {
                    self.broadcast_typing_event(chat_id, user_id, true, target)
                })
                .await;
        } else if !typing
            .stop(chat_id, user_id, |notified| {
                self.broadcast_typing_event(chat_id, user_id, false, target.or(notified))
            })
            .await
        {
            debug!(chat_id = %chat_id, user_id = %user_id, "Typing stop for untracked indicator");
        }
    }

    /// Expire stale typing indicators, emitting one stop event for each.
    ///
    /// Stop events are queued before the tracker lock is released, so a
    /// restart racing the sweep is always announced after the stop.
    pub async fn sweep_typing(&self) -> usize {
        let expired = self
            .state
            .typing
            .sweep(|entry| {
                self.broadcast_typing_event(entry.chat_id, entry.user_id, false, entry.notify)
            })
            .await;
        for entry in &expired {
            debug!(
                chat_id = %entry.chat_id,
                user_id = %entry.user_id,
                "Cleaned up stale typing indicator"
            );
        }
        expired.len()
    }

    pub fn spawn_typing_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(hub.settings.typing_sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = hub.shutdown.cancelled() => {
                        info!("Typing cleanup stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        hub.sweep_typing().await;
                    }
                }
            }
        })
    }

    pub async fn is_user_online(&self, user_id: UserId) -> bool {
        self.state.registry.has_connections(user_id).await
    }

    /// Last-seen time of an offline user. `None` when online or never seen.
    pub async fn user_last_seen(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        if self.is_user_online(user_id).await {
            return None;
        }
        self.state.presence.last_seen(user_id).await
    }

    pub async fn user_status(&self, user_id: UserId) -> (PresenceStatus, Option<DateTime<Utc>>) {
        if self.is_user_online(user_id).await {
            (PresenceStatus::Online, None)
        } else {
            (PresenceStatus::Offline, self.state.presence.last_seen(user_id).await)
        }
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.state.registry.online_users().await
    }

    pub async fn connection_count(&self, user_id: UserId) -> usize {
        self.state.registry.connection_count(user_id).await
    }

    pub async fn typing_users_in_chat(&self, chat_id: ChatId) -> Vec<UserId> {
        self.state.typing.typing_users(chat_id).await
    }

    pub async fn stats(&self) -> HubStats {
        let registry = self.state.registry.stats().await;
        HubStats {
            total_connections: registry.total_connections,
            unique_users: registry.unique_users,
            last_seen_records: self.state.presence.len().await,
            typing_entries: self.state.typing.len().await,
        }
    }
}

impl HubLoop {
    pub async fn run(mut self) {
        info!("Chat hub started");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Chat hub shutting down");
                    self.close_all_connections().await;
                    return;
                }
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => return,
                },
            }
        }
    }

    async fn handle(&self, command: HubCommand) {
        match command {
            HubCommand::Register(conn) => self.register_client(conn).await,
            HubCommand::Unregister(conn) => self.unregister_client(conn).await,
            HubCommand::Broadcast(envelope) => self.broadcast_message(&envelope).await,
            HubCommand::Sync(done) => {
                let _ = done.send(());
            }
        }
    }

    async fn register_client(&self, conn: Arc<Connection>) {
        let user_id = conn.user_id();
        if conn.is_closed() {
            debug!(user_id = %user_id, connection_id = %conn.id(), "Skipping closed connection");
            return;
        }

        // Only this loop mutates the registry, so the check cannot go stale.
        let is_first_connection = !self.state.registry.has_connections(user_id).await;
        if is_first_connection {
            self.state.presence.mark_online(user_id).await;
        }
        if !self.state.registry.insert(conn.clone()).await {
            debug!(user_id = %user_id, connection_id = %conn.id(), "Connection already registered");
            return;
        }

        let total_user_connections = self.state.registry.connection_count(user_id).await;
        info!(
            user_id = %user_id,
            connection_id = %conn.id(),
            total_user_connections,
            is_first_connection,
            "WebSocket client connected"
        );

        if is_first_connection {
            let event = OutboundEvent::UserOnline { user_id, status: PresenceStatus::Online };
            self.broadcast_message(&BroadcastEnvelope::new(event)).await;
        }
        self.send_catch_up(&conn).await;
    }

    /// Online users and last-seen records, for the new connection only.
    async fn send_catch_up(&self, conn: &Arc<Connection>) {
        let user_id = conn.user_id();
        let online_users: Vec<UserId> = self
            .state
            .registry
            .online_users()
            .await
            .into_iter()
            .filter(|uid| *uid != user_id)
            .collect();
        let online_count = online_users.len();

        if let Err(e) = conn.send_event(OutboundEvent::OnlineUsersList { online_users }).await {
            warn!(user_id = %user_id, error = %e, "Failed to send online_users_list to client");
            self.queue_unregister(conn.clone());
            return;
        }
        debug!(user_id = %user_id, online_count, "Sent online_users_list to new client");

        let users_last_seen = self.state.presence.snapshot().await;
        if users_last_seen.is_empty() {
            return;
        }
        let count = users_last_seen.len();
        if let Err(e) = conn.send_event(OutboundEvent::UsersLastSeen { users_last_seen }).await {
            warn!(user_id = %user_id, error = %e, "Failed to send users_last_seen to client");
            self.queue_unregister(conn.clone());
            return;
        }
        debug!(user_id = %user_id, count, "Sent users_last_seen to new client");
    }

    async fn unregister_client(&self, conn: Arc<Connection>) {
        let user_id = conn.user_id();
        match self.state.registry.remove(&conn).await {
            Removal::NotPresent => {
                debug!(user_id = %user_id, connection_id = %conn.id(), "Connection not registered");
            }
            Removal::Remaining(remaining) => {
                conn.close().await;
                info!(
                    user_id = %user_id,
                    connection_id = %conn.id(),
                    remaining_connections = remaining,
                    is_last_connection = false,
                    "WebSocket client disconnected"
                );
            }
            Removal::LastConnection => {
                conn.close().await;
                let now = Utc::now();
                self.state.presence.mark_offline(user_id, now).await;
                info!(
                    user_id = %user_id,
                    connection_id = %conn.id(),
                    is_last_connection = true,
                    "WebSocket client disconnected"
                );

                let event = OutboundEvent::UserOffline {
                    user_id,
                    status: PresenceStatus::Offline,
                    last_seen: rfc3339(now),
                };
                let envelope = BroadcastEnvelope::from_frame(OutboundFrame::at(event, now));
                self.broadcast_message(&envelope).await;
            }
        }
    }

    async fn broadcast_message(&self, envelope: &BroadcastEnvelope) {
        let report = router::dispatch(&self.state.registry, envelope).await;
        for conn in report.failed {
            self.queue_unregister(conn);
        }
    }

    /// Unregistration never happens inline from a failed write; it is queued
    /// behind whatever is already waiting.
    fn queue_unregister(&self, conn: Arc<Connection>) {
        let _ = self.commands.send(HubCommand::Unregister(conn));
    }

    async fn close_all_connections(&self) {
        let connections = self.state.registry.drain().await;
        let count = connections.len();
        join_all(connections.iter().map(|conn| conn.close())).await;
        info!(closed_connections = count, "All connections closed");
    }
}
