use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Comma separated list of origins allowed to open a WebSocket
    pub allowed_origins: Option<String>,

    /// Reject upgrades from origins outside `allowed_origins` instead of only logging them
    #[serde(default)]
    pub enforce_origin: bool,

    /// Shared HS256 secret for user and service tokens
    pub auth_jwt_secret: Option<String>,

    /// Base URL of the chat service used to resolve chat participants
    pub chat_service_url: Option<String>,

    /// Name this service uses in the tokens it issues
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Largest inbound frame the hub will process
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Largest frame the transport accepts at all. Must exceed `max_message_bytes`
    /// so oversized frames reach the handler and get an error reply.
    #[serde(default = "default_transport_max_message_bytes")]
    pub transport_max_message_bytes: usize,

    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    #[serde(default = "default_rate_limit_max_messages")]
    pub rate_limit_max_messages: usize,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Typing indicators older than this are expired by the sweeper
    #[serde(default = "default_typing_timeout_secs")]
    pub typing_timeout_secs: u64,

    #[serde(default = "default_typing_sweep_interval_secs")]
    pub typing_sweep_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                config.validate()?;
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.transport_max_message_bytes <= self.max_message_bytes {
            return Err(ConfigError::Invalid(format!(
                "TRANSPORT_MAX_MESSAGE_BYTES ({}) must be larger than MAX_MESSAGE_BYTES ({})",
                self.transport_max_message_bytes, self.max_message_bytes
            )));
        }
        if self.rate_limit_max_messages == 0 || self.rate_limit_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate limit window and max messages must be non-zero".to_string(),
            ));
        }
        let durations = [
            ("HEARTBEAT_INTERVAL_SECS", self.heartbeat_interval_secs),
            ("READ_TIMEOUT_SECS", self.read_timeout_secs),
            ("WRITE_TIMEOUT_SECS", self.write_timeout_secs),
            ("TYPING_TIMEOUT_SECS", self.typing_timeout_secs),
            ("TYPING_SWEEP_INTERVAL_SECS", self.typing_sweep_interval_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
        }
        Ok(())
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "prod" || self.environment.to_lowercase() == "production"
    }

    /// Parsed origin allow-list. Empty means every origin is accepted.
    pub fn origin_allow_list(&self) -> Vec<String> {
        self.allowed_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_secs(self.typing_timeout_secs)
    }

    pub fn typing_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.typing_sweep_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            allowed_origins: None,
            enforce_origin: false,
            auth_jwt_secret: None,
            chat_service_url: None,
            service_name: default_service_name(),
            max_message_bytes: default_max_message_bytes(),
            transport_max_message_bytes: default_transport_max_message_bytes(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            rate_limit_max_messages: default_rate_limit_max_messages(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            typing_timeout_secs: default_typing_timeout_secs(),
            typing_sweep_interval_secs: default_typing_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "chat-hub".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_max_message_bytes() -> usize {
    512 * 1024
}

fn default_transport_max_message_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_heartbeat_interval_secs() -> u64 {
    20
}

fn default_read_timeout_secs() -> u64 {
    90
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_rate_limit_max_messages() -> usize {
    60
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_typing_timeout_secs() -> u64 {
    5
}

fn default_typing_sweep_interval_secs() -> u64 {
    5
}
