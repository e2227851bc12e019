use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChatId, ChatMessage, MessageId, UserId};

/// Events the chat service publishes into the hub.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublishRequest {
    NewMessage {
        chat_id: ChatId,
        message: ChatMessage,
    },
    MessageRead {
        chat_id: ChatId,
        message_id: Option<MessageId>,
        #[serde(default)]
        message_ids: Vec<MessageId>,
        read_by: UserId,
        read_at: Option<DateTime<Utc>>,
        #[serde(default)]
        target_user_ids: Vec<UserId>,
    },
    MessageDelivered {
        chat_id: ChatId,
        message_id: MessageId,
        delivered_at: DateTime<Utc>,
        #[serde(default)]
        target_user_ids: Vec<UserId>,
    },
    Typing {
        chat_id: ChatId,
        user_id: UserId,
        is_typing: bool,
        target_user_id: Option<UserId>,
    },
}

impl PublishRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            PublishRequest::NewMessage { .. } => "new_message",
            PublishRequest::MessageRead { .. } => "message_read",
            PublishRequest::MessageDelivered { .. } => "message_delivered",
            PublishRequest::Typing { .. } => "typing",
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PublishResponse {
    pub accepted: bool,
    pub event: String,
}
