use tracing::debug;

use crate::error::HubError;
use crate::models::OutboundEvent;
use crate::ws::Connection;

/// Reply to an application-level ping on the same connection.
pub async fn handle_ping_message(conn: &Connection) -> Result<(), HubError> {
    debug!(user_id = %conn.user_id(), connection_id = %conn.id(), "Ping message received");
    conn.send_event(OutboundEvent::Pong).await
}
