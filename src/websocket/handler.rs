use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::HubError;
use crate::models::{ErrorCode, ErrorResponse, OutboundEvent, ReceivedMessage, UserId};
use crate::services::auth_service::get_auth_token;
use crate::state::AppState;
use crate::websocket::guards::{check_message_size, check_origin, OriginCheck};
use crate::websocket::msg_mark_read_handler::handle_mark_read_message;
use crate::websocket::msg_ping_handler::handle_ping_message;
use crate::websocket::msg_typing_handler::handle_typing_message;
use crate::websocket::msg_user_status_handler::handle_user_status_message;
use crate::ws::{Connection, RegistrationGuard};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// WebSocket handler
///
/// Authenticates before upgrading: a failed check answers `401` and leaves no
/// trace in the hub.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match get_auth_token(&headers, query.token.as_deref())
        .and_then(|token| state.validator.validate_user_token(&token))
    {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!(error = %e, "WebSocket authentication failed");
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    match check_origin(&headers, &state.config.origin_allow_list()) {
        OriginCheck::Allowed => {}
        OriginCheck::Missing => debug!(user_id = %user_id, "WebSocket request without Origin header"),
        OriginCheck::Mismatch(origin) if state.config.enforce_origin => {
            warn!(user_id = %user_id, origin = %origin, "Rejecting WebSocket from disallowed origin");
            return ErrorResponse::reply(StatusCode::FORBIDDEN, "origin not allowed").into_response();
        }
        OriginCheck::Mismatch(origin) => {
            warn!(user_id = %user_id, origin = %origin, "WebSocket origin not in allow-list, accepting anyway");
        }
    }

    info!(user_id = %user_id, "New WebSocket connection attempt");
    ws.max_message_size(state.config.transport_max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let conn = Arc::new(Connection::new(user_id, Box::pin(sender), state.config.write_timeout()));
    info!(user_id = %user_id, connection_id = %conn.id(), "WebSocket connection established");

    // The ack goes out before registration so it precedes the presence snapshot.
    if let Err(e) = conn.send_event(OutboundEvent::Connected { user_id }).await {
        warn!(user_id = %user_id, connection_id = %conn.id(), error = %e, "Failed to send connected ack");
        return;
    }
    state.hub.register(conn.clone());
    let guard = RegistrationGuard::new(state.hub.clone(), conn.clone());

    let heartbeat = tokio::spawn(run_heartbeat(conn.clone(), state.config.heartbeat_interval()));
    let read_timeout = state.config.read_timeout();

    loop {
        let next = tokio::select! {
            _ = conn.closed() => break,
            next = timeout(read_timeout, receiver.next()) => next,
        };

        let msg = match next {
            Err(_) => {
                info!(user_id = %user_id, connection_id = %conn.id(), "Read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(user_id = %user_id, connection_id = %conn.id(), error = %e, "WebSocket read error");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        let flow = match msg {
            Message::Text(text) => process_frame(&state, guard.connection(), text.as_bytes()).await,
            Message::Binary(data) => process_frame(&state, guard.connection(), &data).await,
            // Control frames only refresh the read deadline
            Message::Ping(_) | Message::Pong(_) => ControlFlow::Continue(()),
            Message::Close(_) => ControlFlow::Break(()),
        };
        if flow.is_break() {
            break;
        }
    }

    heartbeat.abort();
    info!(user_id = %user_id, connection_id = %conn.id(), "WebSocket connection terminated");
}

/// Size check, quota check, then dispatch on the message type.
async fn process_frame(state: &AppState, conn: &Connection, raw: &[u8]) -> ControlFlow<()> {
    let user_id = conn.user_id();

    if let Err(e) = check_message_size(raw.len(), state.config.max_message_bytes) {
        warn!(user_id = %user_id, size = raw.len(), "Message too large");
        return reply_error(conn, ErrorCode::MessageTooLarge, e.to_string()).await;
    }

    if !state.rate_limiter.check_limit(user_id).await {
        warn!(user_id = %user_id, "Rate limit exceeded");
        return reply_error(conn, ErrorCode::RateLimited, "rate limit exceeded").await;
    }

    let received: ReceivedMessage = match serde_json::from_slice(raw) {
        Ok(received) => received,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Failed to parse message");
            return ControlFlow::Continue(());
        }
    };

    let result = match received {
        ReceivedMessage::Ping => handle_ping_message(conn).await,
        ReceivedMessage::Typing(msg) => handle_typing_message(state, conn, &msg).await,
        ReceivedMessage::MarkRead(msg) => handle_mark_read_message(state, conn, &msg).await,
        ReceivedMessage::GetUserStatus(req) => handle_user_status_message(state, conn, &req).await,
        ReceivedMessage::Logout => {
            info!(user_id = %user_id, connection_id = %conn.id(), "Client logged out");
            conn.close().await;
            return ControlFlow::Break(());
        }
        ReceivedMessage::Unknown => {
            debug!(user_id = %user_id, "Ignoring unknown message type");
            Ok(())
        }
    };
    continue_unless_failed(conn, result)
}

async fn reply_error(conn: &Connection, code: ErrorCode, error: impl Into<String>) -> ControlFlow<()> {
    let result = conn.send_event(OutboundEvent::error(code, error)).await;
    continue_unless_failed(conn, result)
}

fn continue_unless_failed(conn: &Connection, result: Result<(), HubError>) -> ControlFlow<()> {
    match result {
        Ok(()) => ControlFlow::Continue(()),
        Err(e) => {
            warn!(user_id = %conn.user_id(), connection_id = %conn.id(), error = %e, "Failed to reply to client");
            ControlFlow::Break(())
        }
    }
}

/// Ping the client every `every` until the connection closes. A failed ping
/// closes the connection, which ends its reader loop.
async fn run_heartbeat(conn: Arc<Connection>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = conn.closed() => return,
            _ = ticker.tick() => {
                if let Err(e) = conn.send(Message::Ping(Vec::new())).await {
                    debug!(user_id = %conn.user_id(), connection_id = %conn.id(), error = %e, "Heartbeat failed, closing connection");
                    conn.close().await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::testing::{broken_connection, recording_connection};

    #[tokio::test(start_paused = true)]
    async fn heartbeat_pings_until_closed() {
        let (conn, mut rx) = recording_connection(1);
        let task = tokio::spawn(run_heartbeat(conn.clone(), Duration::from_secs(20)));

        tokio::time::sleep(Duration::from_secs(41)).await;
        let mut pings = 0;
        while let Ok(msg) = rx.try_recv() {
            assert!(matches!(msg, Message::Ping(_)));
            pings += 1;
        }
        assert_eq!(pings, 2);

        conn.close().await;
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_heartbeat_closes_connection() {
        let conn = broken_connection(1);
        run_heartbeat(conn.clone(), Duration::from_secs(20)).await;
        assert!(conn.is_closed());
    }
}
