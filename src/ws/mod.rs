pub mod connection;
pub mod guard;
pub mod hub;
pub mod presence;
pub mod ratelimit;
pub mod registry;
pub mod router;
pub mod typing;

pub use connection::{Connection, ConnectionId, FrameSink};
pub use guard::RegistrationGuard;
pub use hub::{ChatHub, HubLoop, HubSettings, HubStats};
pub use ratelimit::RateLimiter;
pub use router::BroadcastEnvelope;
