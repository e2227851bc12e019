pub mod guards;
pub mod handler;
pub mod msg_mark_read_handler;
pub mod msg_ping_handler;
pub mod msg_typing_handler;
pub mod msg_user_status_handler;

pub use handler::websocket_handler;
