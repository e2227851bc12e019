use tracing::{debug, warn};

use crate::error::HubError;
use crate::models::MarkReadMessage;
use crate::state::AppState;
use crate::ws::Connection;

/// Emit a read receipt to the reader's own connections and, when it can be
/// resolved, the other participant. Persisting the read state is up to the
/// chat service.
pub async fn handle_mark_read_message(
    state: &AppState,
    conn: &Connection,
    msg: &MarkReadMessage,
) -> Result<(), HubError> {
    let user_id = conn.user_id();
    let Some(chat_id) = msg.chat_id() else {
        warn!(user_id = %user_id, "mark_read without chat_id, dropping");
        return Ok(());
    };
    let Some(message_id) = msg.message_id else {
        warn!(user_id = %user_id, chat_id = %chat_id, "mark_read without message_id, dropping");
        return Ok(());
    };

    let mut targets = vec![user_id];
    if let Some(directory) = &state.directory {
        match directory.counterpart(chat_id, user_id).await {
            Ok(Some(counterpart)) => targets.push(counterpart),
            Ok(None) => debug!(chat_id = %chat_id, user_id = %user_id, "No counterpart for read receipt"),
            Err(e) => warn!(chat_id = %chat_id, error = %e, "Failed to resolve chat participants for read receipt"),
        }
    }

    state.hub.broadcast_message_read(chat_id, message_id, user_id, targets);
    Ok(())
}
