//! Client session configuration

use serde::Deserialize;
use std::time::Duration;

use crate::client::{Backoff, ReconnectPolicy, SessionSettings};

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint of the realtime server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Base URL of the poll API used for baseline reads
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff: Backoff,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl ClientConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
            backoff: self.backoff,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            policy: self.reconnect_policy(),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(ValidationError::InvalidUrl("client.server_url", "ws:// or wss://"));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ValidationError::InvalidUrl("client.api_url", "http:// or https://"));
        }
        if self.base_delay_ms == 0 {
            return Err(ValidationError::OutOfRange {
                field: "client.base_delay_ms",
                min: 1,
                max: self.max_delay_ms,
            });
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ValidationError::InvalidBackoffRange);
        }
        if self.ping_interval_secs == 0 || self.ping_interval_secs >= self.pong_timeout_secs {
            return Err(ValidationError::OutOfRange {
                field: "client.ping_interval_secs",
                min: 1,
                max: self.pong_timeout_secs.saturating_sub(1),
            });
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_url: default_api_url(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
        }
    }
}

fn default_server_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_api_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_ping_interval() -> u64 {
    25
}

fn default_pong_timeout() -> u64 {
    60
}
