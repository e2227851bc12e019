use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type ChatId = i64;
pub type MessageId = i64;

/// A chat message as published by the chat service.
///
/// The hub only needs the routing fields; everything else the chat service
/// sends is carried through untouched in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The two participants of a 1:1 chat.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatParticipants {
    pub chat_id: ChatId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
}

impl ChatParticipants {
    /// The other participant, or `None` when `user_id` is not part of the chat.
    pub fn counterpart_of(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.buyer_id {
            Some(self.seller_id)
        } else if user_id == self.seller_id {
            Some(self.buyer_id)
        } else {
            None
        }
    }
}
