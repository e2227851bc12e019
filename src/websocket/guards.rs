use axum::http::{header, HeaderMap};

use crate::error::HubError;

/// Reject frames larger than `limit` bytes before they are parsed.
pub fn check_message_size(size: usize, limit: usize) -> Result<(), HubError> {
    if size > limit {
        return Err(HubError::MessageTooLarge { size, limit });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginCheck {
    Allowed,
    /// No `Origin` header, as sent by non-browser clients.
    Missing,
    Mismatch(String),
}

/// Compare the request origin with the allow-list. An empty list allows all.
pub fn check_origin(headers: &HeaderMap, allow_list: &[String]) -> OriginCheck {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return OriginCheck::Missing;
    };
    let origin = String::from_utf8_lossy(origin.as_bytes());
    let origin = origin.trim_end_matches('/');

    if allow_list.is_empty() || allow_list.iter().any(|allowed| allowed == origin) {
        OriginCheck::Allowed
    } else {
        OriginCheck::Mismatch(origin.to_string())
    }
}
