use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};

use crate::services::auth_service::get_auth_token;
use crate::state::AppState;

/// Name of the service that authenticated the request.
#[derive(Debug, Clone)]
pub struct ServicePrincipal(pub String);

/// Only lets requests carrying a valid service token through.
pub async fn service_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Get the auth token from the request
    let token = get_auth_token(req.headers(), None).map_err(|e| {
        warn!(error = %e, "Missing service token");
        StatusCode::UNAUTHORIZED
    })?;

    // 2. Validate it as a service token
    let service = state.validator.validate_service_token(&token).map_err(|e| {
        warn!(error = %e, "Service token validation failed");
        StatusCode::UNAUTHORIZED
    })?;
    info!(service = %service, path = %req.uri().path(), "Service token validated successfully");

    // 3. Make the caller known to downstream handlers
    req.extensions_mut().insert(ServicePrincipal(service));

    Ok(next.run(req).await)
}
