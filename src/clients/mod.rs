pub mod chat_service_client;

pub use chat_service_client::{ChatDirectory, ChatServiceClient, InMemoryChatDirectory};
