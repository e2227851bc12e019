pub mod events;
pub mod stats;

pub use events::*;
pub use stats::*;
