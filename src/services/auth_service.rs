use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::AuthError;
use crate::models::UserId;

const AUTH_COOKIE: &str = "auth_token";

// Get the auth token from a request: query string first, then the
// Authorization header, then the auth_token cookie
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, AuthError> {
    if let Some(token) = query_token.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::MalformedHeader("Authorization"))?;
        let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        return Ok(token.to_string());
    }

    let Some(cookie_header) = headers.get(header::COOKIE) else {
        return Err(AuthError::MissingToken);
    };
    let cookie_str = cookie_header
        .to_str()
        .map_err(|_| AuthError::MalformedHeader("Cookie"))?;
    cookie::Cookie::split_parse(cookie_str)
        .flatten()
        .find(|c| c.name() == AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AuthError::MissingToken)
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Value>(token, &decoding_key, &validation)
}

pub fn sign_jwt<T: Serialize>(claims: &T, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// Extract the user id from user token claims.
///
/// The token type must be `user` or absent. The id comes from `sub`, or
/// `user_id` when there is no `sub`, as a number or numeric string.
pub fn user_id_from_claims(claims: &Value) -> Result<UserId, AuthError> {
    match claims.get("type").and_then(|v| v.as_str()) {
        None | Some("user") => {}
        Some(other) => return Err(AuthError::WrongTokenType(other.to_string())),
    }

    let subject = claims
        .get("sub")
        .or_else(|| claims.get("user_id"))
        .ok_or(AuthError::MissingSubject)?;
    let user_id = match subject {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AuthError::InvalidUserId(subject.to_string()))?;

    if user_id <= 0 {
        return Err(AuthError::InvalidUserId(user_id.to_string()));
    }
    Ok(user_id)
}

/// Extract the service name from service token claims.
pub fn service_name_from_claims(claims: &Value) -> Result<String, AuthError> {
    let token_type = claims.get("type").and_then(|v| v.as_str()).unwrap_or("none");
    if token_type != "service" {
        return Err(AuthError::WrongTokenType(token_type.to_string()));
    }
    claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(AuthError::MissingSubject)
}

/// Turns bearer tokens into verified identities.
pub trait TokenValidator: Send + Sync {
    fn validate_user_token(&self, token: &str) -> Result<UserId, AuthError>;

    fn validate_service_token(&self, token: &str) -> Result<String, AuthError>;
}

/// HS256 validator sharing one secret with the issuing services.
pub struct JwtTokenValidator {
    secret: String,
}

impl JwtTokenValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

impl TokenValidator for JwtTokenValidator {
    fn validate_user_token(&self, token: &str) -> Result<UserId, AuthError> {
        let token_data = validate_jwt(token, &self.secret)?;
        let user_id = user_id_from_claims(&token_data.claims)?;
        debug!(user_id = %user_id, "User token validated successfully");
        Ok(user_id)
    }

    fn validate_service_token(&self, token: &str) -> Result<String, AuthError> {
        let token_data = validate_jwt(token, &self.secret)?;
        let service = service_name_from_claims(&token_data.claims)?;
        debug!(service = %service, "Service token validated successfully");
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token(claims: Value) -> String {
        sign_jwt(&claims, SECRET).unwrap()
    }

    fn exp() -> i64 {
        Utc::now().timestamp() + 300
    }

    #[test]
    fn token_sources_in_priority_order() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; auth_token=from-cookie"));
        assert_eq!(get_auth_token(&headers, None).unwrap(), "from-cookie");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(get_auth_token(&headers, None).unwrap(), "from-header");
        assert_eq!(get_auth_token(&headers, Some("from-query")).unwrap(), "from-query");

        assert!(matches!(
            get_auth_token(&HeaderMap::new(), Some("")),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn user_tokens_resolve_numeric_ids() {
        let validator = JwtTokenValidator::new(SECRET);
        let by_sub = token(json!({"sub": "42", "type": "user", "exp": exp()}));
        assert_eq!(validator.validate_user_token(&by_sub).unwrap(), 42);

        let by_user_id = token(json!({"user_id": 7, "exp": exp()}));
        assert_eq!(validator.validate_user_token(&by_user_id).unwrap(), 7);
    }

    #[test]
    fn rejects_bad_user_tokens() {
        let validator = JwtTokenValidator::new(SECRET);

        let zero = token(json!({"sub": "0", "exp": exp()}));
        assert!(matches!(validator.validate_user_token(&zero), Err(AuthError::InvalidUserId(_))));

        let name = token(json!({"sub": "alice", "exp": exp()}));
        assert!(matches!(validator.validate_user_token(&name), Err(AuthError::InvalidUserId(_))));

        let service = token(json!({"sub": "chat-service", "type": "service", "exp": exp()}));
        assert!(matches!(validator.validate_user_token(&service), Err(AuthError::WrongTokenType(_))));

        let foreign = sign_jwt(&json!({"sub": "1", "exp": exp()}), "other-secret").unwrap();
        assert!(matches!(validator.validate_user_token(&foreign), Err(AuthError::InvalidToken(_))));

        let expired = token(json!({"sub": "1", "exp": Utc::now().timestamp() - 3600}));
        assert!(validator.validate_user_token(&expired).is_err());
    }

    #[test]
    fn service_tokens_require_service_type() {
        let validator = JwtTokenValidator::new(SECRET);
        let service = token(json!({"sub": "chat-service", "type": "service", "exp": exp()}));
        assert_eq!(validator.validate_service_token(&service).unwrap(), "chat-service");

        let user = token(json!({"sub": "1", "type": "user", "exp": exp()}));
        assert!(matches!(validator.validate_service_token(&user), Err(AuthError::WrongTokenType(_))));
    }
}
