use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DirectoryError;
use crate::models::{ChatId, ChatParticipants, UserId};
use crate::services::auth_service::sign_jwt;

/// Resolves who takes part in a chat.
pub trait ChatDirectory: Send + Sync {
    /// `Ok(None)` when the chat does not exist.
    fn participants(
        &self,
        chat_id: ChatId,
    ) -> BoxFuture<'_, Result<Option<ChatParticipants>, DirectoryError>>;

    /// The other participant of `chat_id`, seen from `user_id`.
    fn counterpart(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Option<UserId>, DirectoryError>> {
        Box::pin(async move {
            Ok(self
                .participants(chat_id)
                .await?
                .and_then(|chat| chat.counterpart_of(user_id)))
        })
    }
}

#[derive(Debug)]
pub struct ChatServiceClient {
    client: Client,
    base_url: String,
    jwt_secret: String,
    service_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

impl ChatServiceClient {
    pub fn new(
        base_url: impl Into<String>,
        jwt_secret: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Result<Self, DirectoryError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            jwt_secret: jwt_secret.into(),
            service_name: service_name.into(),
        })
    }

    fn generate_token(&self) -> Result<String, DirectoryError> {
        // 1 minute expiration
        let expiration = Utc::now().timestamp() + 60;

        let claims = Claims {
            sub: self.service_name.clone(),
            type_: "service".to_string(),
            exp: expiration as usize,
        };
        Ok(sign_jwt(&claims, &self.jwt_secret)?)
    }

    async fn fetch_participants(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<ChatParticipants>, DirectoryError> {
        let token = self.generate_token()?;
        let url = format!("{}/v1/chats/{}/participants", self.base_url, chat_id);
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(chat_id = %chat_id, "Chat not found in chat service");
            return Ok(None);
        }
        let participants = response.error_for_status()?.json::<ChatParticipants>().await?;
        Ok(Some(participants))
    }
}

impl ChatDirectory for ChatServiceClient {
    fn participants(
        &self,
        chat_id: ChatId,
    ) -> BoxFuture<'_, Result<Option<ChatParticipants>, DirectoryError>> {
        Box::pin(self.fetch_participants(chat_id))
    }
}

/// Fixed set of chats, for local runs and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryChatDirectory {
    chats: HashMap<ChatId, ChatParticipants>,
}

impl InMemoryChatDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat(mut self, chat_id: ChatId, buyer_id: UserId, seller_id: UserId) -> Self {
        self.chats.insert(chat_id, ChatParticipants { chat_id, buyer_id, seller_id });
        self
    }
}

impl ChatDirectory for InMemoryChatDirectory {
    fn participants(
        &self,
        chat_id: ChatId,
    ) -> BoxFuture<'_, Result<Option<ChatParticipants>, DirectoryError>> {
        let chat = self.chats.get(&chat_id).copied();
        Box::pin(async move { Ok(chat) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth_service::{JwtTokenValidator, TokenValidator};
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::get;
    use axum::{Json, Router};

    const SECRET: &str = "directory-secret";

    async fn participants_endpoint(
        Path(chat_id): Path<ChatId>,
        headers: HeaderMap,
    ) -> Result<Json<ChatParticipants>, HttpStatus> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(HttpStatus::UNAUTHORIZED)?;
        JwtTokenValidator::new(SECRET)
            .validate_service_token(token)
            .map_err(|_| HttpStatus::UNAUTHORIZED)?;

        match chat_id {
            9 => Ok(Json(ChatParticipants { chat_id, buyer_id: 1, seller_id: 2 })),
            13 => Err(HttpStatus::INTERNAL_SERVER_ERROR),
            _ => Err(HttpStatus::NOT_FOUND),
        }
    }

    async fn spawn_chat_service() -> String {
        let app = Router::new().route("/v1/chats/:chat_id/participants", get(participants_endpoint));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn client_resolves_participants_with_service_token() {
        let base_url = spawn_chat_service().await;
        let client = ChatServiceClient::new(base_url, SECRET, "chat-hub").unwrap();

        assert_eq!(client.counterpart(9, 1).await.unwrap(), Some(2));
        assert_eq!(client.counterpart(9, 5).await.unwrap(), None);
        assert_eq!(client.participants(404).await.unwrap(), None);
        assert!(matches!(client.participants(13).await, Err(DirectoryError::Http(_))));
    }

    #[tokio::test]
    async fn client_with_wrong_secret_is_rejected() {
        let base_url = spawn_chat_service().await;
        let client = ChatServiceClient::new(base_url, "wrong", "chat-hub").unwrap();
        assert!(client.participants(9).await.is_err());
    }

    #[tokio::test]
    async fn in_memory_directory() {
        let directory = InMemoryChatDirectory::new().with_chat(3, 10, 20);
        assert_eq!(directory.counterpart(3, 20).await.unwrap(), Some(10));
        assert_eq!(directory.counterpart(4, 20).await.unwrap(), None);
    }
}
