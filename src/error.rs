use std::time::Duration;
use thiserror::Error;

/// Failures while writing to or managing a single hub connection.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("connection is closed")]
    ConnectionClosed,

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing authentication token")]
    MissingToken,

    #[error("malformed {0} header")]
    MalformedHeader(&'static str),

    #[error("token validation failed: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token does not carry a subject")]
    MissingSubject,

    #[error("token subject '{0}' is not a valid user id")]
    InvalidUserId(String),

    #[error("unexpected token type '{0}'")]
    WrongTokenType(String),
}

/// Failures of the chat participant lookup.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("chat service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to sign service token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}
