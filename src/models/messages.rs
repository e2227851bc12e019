use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChatId, ChatMessage, MessageId, UserId};

/// Nested payload some clients send instead of flat fields.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct InboundPayload {
    pub chat_id: Option<ChatId>,
    pub user_id: Option<UserId>,
    pub is_typing: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct TypingMessage {
    pub chat_id: Option<ChatId>,
    pub is_typing: Option<bool>,
    pub payload: Option<InboundPayload>,
}

impl TypingMessage {
    pub fn chat_id(&self) -> Option<ChatId> {
        self.chat_id
            .or_else(|| self.payload.as_ref().and_then(|p| p.chat_id))
    }

    /// A typing frame without an explicit flag means the user started typing.
    pub fn is_typing(&self) -> bool {
        self.is_typing
            .or_else(|| self.payload.as_ref().and_then(|p| p.is_typing))
            .unwrap_or(true)
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct MarkReadMessage {
    pub chat_id: Option<ChatId>,
    pub message_id: Option<MessageId>,
    pub payload: Option<InboundPayload>,
}

impl MarkReadMessage {
    pub fn chat_id(&self) -> Option<ChatId> {
        self.chat_id
            .or_else(|| self.payload.as_ref().and_then(|p| p.chat_id))
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct UserStatusRequest {
    pub user_id: Option<UserId>,
    pub payload: Option<InboundPayload>,
}

impl UserStatusRequest {
    pub fn user_id(&self) -> Option<UserId> {
        self.payload
            .as_ref()
            .and_then(|p| p.user_id)
            .or(self.user_id)
    }
}

/// Frames a client may send over the socket.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReceivedMessage {
    Ping,
    Typing(TypingMessage),
    Logout,
    MarkRead(MarkReadMessage),
    GetUserStatus(UserStatusRequest),
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RateLimited,
    MessageTooLarge,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserLastSeen {
    pub user_id: UserId,
    pub last_seen: String,
}

/// Events the hub sends to clients.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Connected {
        user_id: UserId,
    },
    Pong,
    NewMessage {
        chat_id: ChatId,
        message: ChatMessage,
    },
    MessageRead {
        chat_id: ChatId,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<MessageId>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        message_ids: Vec<MessageId>,
        read_by: UserId,
    },
    MessageDelivered {
        chat_id: ChatId,
        message_id: MessageId,
        delivered_at: String,
    },
    UserTyping {
        chat_id: ChatId,
        user_id: UserId,
        is_typing: bool,
    },
    UserOnline {
        user_id: UserId,
        status: PresenceStatus,
    },
    UserOffline {
        user_id: UserId,
        status: PresenceStatus,
        last_seen: String,
    },
    OnlineUsersList {
        online_users: Vec<UserId>,
    },
    UsersLastSeen {
        users_last_seen: Vec<UserLastSeen>,
    },
    UserStatus {
        user_id: UserId,
        status: PresenceStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen: Option<String>,
    },
    Error {
        code: ErrorCode,
        error: String,
    },
}

impl OutboundEvent {
    /// Wire name of the event, as found in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::Connected { .. } => "connected",
            OutboundEvent::Pong => "pong",
            OutboundEvent::NewMessage { .. } => "new_message",
            OutboundEvent::MessageRead { .. } => "message_read",
            OutboundEvent::MessageDelivered { .. } => "message_delivered",
            OutboundEvent::UserTyping { .. } => "user_typing",
            OutboundEvent::UserOnline { .. } => "user_online",
            OutboundEvent::UserOffline { .. } => "user_offline",
            OutboundEvent::OnlineUsersList { .. } => "online_users_list",
            OutboundEvent::UsersLastSeen { .. } => "users_last_seen",
            OutboundEvent::UserStatus { .. } => "user_status",
            OutboundEvent::Error { .. } => "error",
        }
    }

    pub fn error(code: ErrorCode, error: impl Into<String>) -> Self {
        OutboundEvent::Error { code, error: error.into() }
    }
}

/// An outbound event stamped with its emission time.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    #[serde(flatten)]
    pub event: OutboundEvent,
    pub timestamp: String,
}

impl OutboundFrame {
    pub fn new(event: OutboundEvent) -> Self {
        Self::at(event, Utc::now())
    }

    pub fn at(event: OutboundEvent, timestamp: DateTime<Utc>) -> Self {
        Self { event, timestamp: rfc3339(timestamp) }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// RFC3339 with second precision and a `Z` suffix.
pub fn rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
