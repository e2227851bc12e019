use std::panic;
use std::sync::Arc;

use chat_hub::clients::{ChatDirectory, ChatServiceClient};
use chat_hub::config::Config;
use chat_hub::routes::create_router;
use chat_hub::services::auth_service::JwtTokenValidator;
use chat_hub::state::AppState;
use chat_hub::ws::{ChatHub, HubSettings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "chat_hub=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting chat hub...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    let config = Arc::new(config);
    info!(
        "Environment: {} (production: {})",
        config.environment,
        config.is_production()
    );

    let Some(jwt_secret) = config.auth_jwt_secret.clone() else {
        error!("AUTH_JWT_SECRET is not configured - cannot authenticate clients");
        std::process::exit(1);
    };

    let shutdown = CancellationToken::new();
    let hub = ChatHub::start(HubSettings::from(config.as_ref()), shutdown.clone());

    // Participant lookup for directed typing indicators
    let directory: Option<Arc<dyn ChatDirectory>> = match &config.chat_service_url {
        Some(url) => match ChatServiceClient::new(url.as_str(), jwt_secret.as_str(), config.service_name.as_str()) {
            Ok(client) => {
                info!("Chat participant lookup via {}", url);
                Some(Arc::new(client))
            }
            Err(e) => {
                error!("Failed to create chat service client: {}", e);
                warn!("Typing indicators will be broadcast to all clients");
                None
            }
        },
        None => {
            warn!("No chat service URL configured - typing indicators will be broadcast to all clients");
            None
        }
    };

    let validator = Arc::new(JwtTokenValidator::new(jwt_secret));
    let state = AppState::new(config.clone(), hub.clone(), validator, directory);
    state.rate_limiter.clone().spawn_gc(shutdown.clone());

    let app_routes = create_router(state);

    // Start the HTTP/WebSocket server
    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());

    if let Err(e) = axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
    {
        error!("Server error: {}", e);
    }

    hub.shutdown();
    info!("Chat hub stopped");
}

/// Wait for Ctrl-C, then stop the hub and its background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
