use tracing::warn;

use crate::error::HubError;
use crate::models::{rfc3339, OutboundEvent, UserStatusRequest};
use crate::state::AppState;
use crate::ws::Connection;

/// Answer a presence query for one user.
pub async fn handle_user_status_message(
    state: &AppState,
    conn: &Connection,
    req: &UserStatusRequest,
) -> Result<(), HubError> {
    let Some(user_id) = req.user_id() else {
        warn!(user_id = %conn.user_id(), "get_user_status without user_id, dropping");
        return Ok(());
    };

    let (status, last_seen) = state.hub.user_status(user_id).await;
    conn.send_event(OutboundEvent::UserStatus {
        user_id,
        status,
        last_seen: last_seen.map(rfc3339),
    })
    .await
}
