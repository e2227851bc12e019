use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::future::join_all;
use tracing::{debug, error, warn};

use super::connection::Connection;
use super::registry::ConnectionRegistry;
use crate::models::{OutboundEvent, OutboundFrame, UserId};

/// An outbound event plus any explicit delivery targets.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEnvelope {
    pub frame: OutboundFrame,
    pub targets: Vec<UserId>,
}

impl BroadcastEnvelope {
    pub fn new(event: OutboundEvent) -> Self {
        Self { frame: OutboundFrame::new(event), targets: Vec::new() }
    }

    pub fn from_frame(frame: OutboundFrame) -> Self {
        Self { frame, targets: Vec::new() }
    }

    pub fn to(mut self, targets: impl IntoIterator<Item = UserId>) -> Self {
        self.targets.extend(targets);
        self
    }
}

/// Who an envelope is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Users(Vec<UserId>),
    Everyone,
    Nobody,
}

/// Decide the audience of an envelope from its event type.
///
/// Only presence is a global signal. Conversation events go to the users
/// involved, and reply-only events are never flooded.
pub fn resolve_route(envelope: &BroadcastEnvelope) -> Route {
    let explicit = dedup(envelope.targets.iter().copied());

    match &envelope.frame.event {
        OutboundEvent::NewMessage { message, .. } => {
            Route::Users(dedup([message.sender_id, message.receiver_id]))
        }
        OutboundEvent::MessageRead { read_by, .. } => {
            if explicit.is_empty() {
                Route::Users(vec![*read_by])
            } else {
                Route::Users(explicit)
            }
        }
        OutboundEvent::MessageDelivered { .. } | OutboundEvent::UserTyping { .. } => {
            if explicit.is_empty() {
                Route::Everyone
            } else {
                Route::Users(explicit)
            }
        }
        OutboundEvent::UserOnline { .. } | OutboundEvent::UserOffline { .. } => Route::Everyone,
        OutboundEvent::Connected { .. }
        | OutboundEvent::Pong
        | OutboundEvent::OnlineUsersList { .. }
        | OutboundEvent::UsersLastSeen { .. }
        | OutboundEvent::UserStatus { .. }
        | OutboundEvent::Error { .. } => {
            if explicit.is_empty() {
                Route::Nobody
            } else {
                Route::Users(explicit)
            }
        }
    }
}

fn dedup(ids: impl IntoIterator<Item = UserId>) -> Vec<UserId> {
    let mut unique = Vec::new();
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: Vec<Arc<Connection>>,
}

/// Resolve the envelope's targets and write to all of them concurrently.
///
/// The registry lock is only held while taking the snapshot. Connections whose
/// write fails are returned in the report so the caller can unregister them.
pub async fn dispatch(registry: &ConnectionRegistry, envelope: &BroadcastEnvelope) -> DispatchReport {
    let kind = envelope.frame.event.kind();
    let targets = match resolve_route(envelope) {
        Route::Everyone => registry.snapshot_all().await,
        Route::Users(user_ids) => registry.snapshot_users(&user_ids).await,
        Route::Nobody => {
            warn!(event = kind, "Dropping unicast event without targets");
            return DispatchReport::default();
        }
    };

    let text = match envelope.frame.to_json() {
        Ok(text) => text,
        Err(e) => {
            error!(event = kind, error = %e, "Failed to serialize broadcast message");
            return DispatchReport::default();
        }
    };

    debug!(event = kind, target_connections = targets.len(), "Broadcasting message");

    let writes = targets.into_iter().map(|conn| {
        let msg = Message::Text(text.clone());
        async move {
            let result = conn.send(msg).await;
            (conn, result)
        }
    });

    let mut report = DispatchReport::default();
    for (conn, result) in join_all(writes).await {
        match result {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(
                    user_id = %conn.user_id(),
                    connection_id = %conn.id(),
                    event = kind,
                    error = %e,
                    "Failed to send message to connection"
                );
                report.failed.push(conn);
            }
        }
    }
    report
}
