pub mod chat;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod messages;

pub use chat::*;
pub use diagnostics::*;
pub use error::*;
pub use events::*;
pub use messages::*;
