use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::models::{ErrorResponse, PublishRequest, PublishResponse};
use crate::routes::auth_middleware::ServicePrincipal;
use crate::state::AppState;

/// Publish a chat event into the hub
///
/// The event is queued for delivery; `202` means accepted, not delivered.
pub async fn publish_event(
    State(state): State<AppState>,
    Extension(service): Extension<ServicePrincipal>,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), (StatusCode, Json<ErrorResponse>)> {
    let kind = request.kind();
    info!(service = %service.0, event = kind, "Event published to hub");

    match request {
        PublishRequest::NewMessage { chat_id, message } => {
            if message.chat_id != chat_id {
                warn!(chat_id = %chat_id, message_chat_id = %message.chat_id, "Chat id mismatch in new_message");
                return Err(ErrorResponse::reply(
                    StatusCode::BAD_REQUEST,
                    "message.chat_id does not match chat_id",
                ));
            }
            state.hub.broadcast_new_message(chat_id, message);
        }
        PublishRequest::MessageRead {
            chat_id,
            message_id,
            message_ids,
            read_by,
            read_at,
            target_user_ids,
        } => {
            if !message_ids.is_empty() {
                let read_at = read_at.unwrap_or_else(Utc::now);
                state
                    .hub
                    .broadcast_messages_read(chat_id, message_ids, read_by, read_at, target_user_ids);
            } else if let Some(message_id) = message_id {
                state
                    .hub
                    .broadcast_message_read(chat_id, message_id, read_by, target_user_ids);
            } else {
                return Err(ErrorResponse::reply(
                    StatusCode::BAD_REQUEST,
                    "message_read requires message_id or message_ids",
                ));
            }
        }
        PublishRequest::MessageDelivered {
            chat_id,
            message_id,
            delivered_at,
            target_user_ids,
        } => {
            state
                .hub
                .broadcast_message_delivered(chat_id, message_id, delivered_at, target_user_ids);
        }
        PublishRequest::Typing {
            chat_id,
            user_id,
            is_typing,
            target_user_id,
        } => {
            state
                .hub
                .set_user_typing(chat_id, user_id, is_typing, target_user_id)
                .await;
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            accepted: true,
            event: kind.to_string(),
        }),
    ))
}
