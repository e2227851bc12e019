use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{hub_stats, publish_event};
use crate::routes::auth_middleware::service_auth_middleware;
use crate::state::AppState;
use crate::websocket::websocket_handler;

/// Service-to-service routes, mounted under `/internal`
pub fn create_internal_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/events", post(publish_event))
        .route("/v1/stats", get(hub_stats))
        .route_layer(middleware::from_fn_with_state(state, service_auth_middleware)) // Applies to all routes added above
}

/// The complete application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .nest("/internal", create_internal_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
