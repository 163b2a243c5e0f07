//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `QUICKPOLL` prefix and
//! `__` between nesting levels.
//!
//! # Example
//!
//! ```no_run
//! use quickpoll_realtime::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod auth;
mod client;
mod error;
mod realtime;
mod server;

pub use auth::AuthConfig;
pub use client::ClientConfig;
pub use error::{ConfigError, ValidationError};
pub use realtime::RealtimeConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration. Every section has defaults, so an empty
/// environment yields a runnable development setup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// Settings for clients built with this crate
    #[serde(default)]
    pub client: ClientConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` if present, then reads `QUICKPOLL__*` variables:
    ///
    /// - `QUICKPOLL__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `QUICKPOLL__REALTIME__QUEUE_CAPACITY=512` -> `realtime.queue_capacity = 512`
    /// - `QUICKPOLL__AUTH__JWT_SECRET=...` -> `auth.jwt_secret`
    /// - `QUICKPOLL__AUTH__INGEST_SECRET=...` -> `auth.ingest_secret`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value cannot be parsed into its field.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("QUICKPOLL")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.realtime.validate()?;
        self.auth.validate(self.server.environment)?;
        self.client.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
