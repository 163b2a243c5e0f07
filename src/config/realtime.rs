//! Broadcast layer configuration

use serde::Deserialize;
use std::time::Duration;

use crate::adapters::websocket::ConnectionSettings;

use super::error::ValidationError;

const MAX_QUEUE_CAPACITY: u64 = 65_536;

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Pending outbound messages kept per connection before drop-oldest
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Close a connection that has not pinged for this long
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Also broadcast updates and deletes to feed subscribers
    #[serde(default)]
    pub feed_lifecycle: bool,
}

impl RealtimeConfig {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue_capacity == 0 || self.queue_capacity as u64 > MAX_QUEUE_CAPACITY {
            return Err(ValidationError::OutOfRange {
                field: "realtime.queue_capacity",
                min: 1,
                max: MAX_QUEUE_CAPACITY,
            });
        }
        if self.idle_timeout_secs == 0 || self.idle_timeout_secs > 3600 {
            return Err(ValidationError::OutOfRange {
                field: "realtime.idle_timeout_secs",
                min: 1,
                max: 3600,
            });
        }
        if self.write_timeout_secs == 0 || self.write_timeout_secs > self.idle_timeout_secs {
            return Err(ValidationError::OutOfRange {
                field: "realtime.write_timeout_secs",
                min: 1,
                max: self.idle_timeout_secs,
            });
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            idle_timeout_secs: default_idle_timeout(),
            write_timeout_secs: default_write_timeout(),
            feed_lifecycle: false,
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_write_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RealtimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, 256);
        assert!(!config.feed_lifecycle);

        let settings = config.connection_settings();
        assert_eq!(settings.idle_timeout, Duration::from_secs(60));
        assert_eq!(settings.write_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = RealtimeConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::OutOfRange {
                field: "realtime.queue_capacity",
                ..
            })
        ));
    }

    #[test]
    fn write_timeout_longer_than_idle_is_rejected() {
        let config = RealtimeConfig {
            idle_timeout_secs: 5,
            write_timeout_secs: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
