use tracing::{debug, warn};

use crate::error::HubError;
use crate::models::TypingMessage;
use crate::state::AppState;
use crate::ws::Connection;

/// Handle a typing start/stop from a client.
///
/// With a chat directory the indicator goes to the other participant only.
/// Without one it goes to everyone.
pub async fn handle_typing_message(
    state: &AppState,
    conn: &Connection,
    msg: &TypingMessage,
) -> Result<(), HubError> {
    let user_id = conn.user_id();
    let Some(chat_id) = msg.chat_id() else {
        warn!(user_id = %user_id, "Typing message without chat_id, dropping");
        return Ok(());
    };
    let is_typing = msg.is_typing();

    let Some(directory) = &state.directory else {
        state.hub.set_user_typing(chat_id, user_id, is_typing, None).await;
        return Ok(());
    };

    match directory.counterpart(chat_id, user_id).await {
        Ok(Some(target)) => {
            debug!(chat_id = %chat_id, user_id = %user_id, target_user_id = %target, is_typing, "Typing indicator");
            state.hub.set_user_typing(chat_id, user_id, is_typing, Some(target)).await;
        }
        Ok(None) => {
            warn!(chat_id = %chat_id, user_id = %user_id, "User is not a participant of the chat, dropping typing event");
        }
        Err(e) => {
            warn!(chat_id = %chat_id, user_id = %user_id, error = %e, "Failed to resolve chat participants, dropping typing event");
        }
    }
    Ok(())
}
