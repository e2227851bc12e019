use std::sync::Arc;

use crate::clients::ChatDirectory;
use crate::config::Config;
use crate::services::auth_service::TokenValidator;
use crate::ws::{ChatHub, RateLimiter};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: ChatHub,
    pub rate_limiter: Arc<RateLimiter>,
    pub validator: Arc<dyn TokenValidator>,
    /// Participant lookup for directed typing and read receipts. Without it
    /// typing indicators are broadcast to everyone.
    pub directory: Option<Arc<dyn ChatDirectory>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        hub: ChatHub,
        validator: Arc<dyn TokenValidator>,
        directory: Option<Arc<dyn ChatDirectory>>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max_messages,
            config.rate_limit_window(),
        ));
        Self { config, hub, rate_limiter, validator, directory }
    }
}
