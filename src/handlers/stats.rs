use axum::{
    extract::{Extension, State},
    Json,
};
use tracing::info;

use crate::models::HubStatsResponse;
use crate::routes::auth_middleware::ServicePrincipal;
use crate::state::AppState;

/// Hub statistics for operators and the chat service
pub async fn hub_stats(
    State(state): State<AppState>,
    Extension(service): Extension<ServicePrincipal>,
) -> Json<HubStatsResponse> {
    let stats = state.hub.stats().await;
    let rate_limited_users = state.rate_limiter.tracked_users().await;

    info!(
        service = %service.0,
        total_connections = stats.total_connections,
        unique_users = stats.unique_users,
        typing_entries = stats.typing_entries,
        "Hub stats requested"
    );

    Json(HubStatsResponse {
        total_connections: stats.total_connections,
        unique_users: stats.unique_users,
        last_seen_records: stats.last_seen_records,
        typing_entries: stats.typing_entries,
        rate_limited_users,
    })
}
