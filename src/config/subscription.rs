use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Polling subscription parameters
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubscriptionConfig {
    /// Interval used when a subscriber does not pick one
    ///
    /// Default: 1000 (1 second)
    #[serde(default = "default_polling_interval_ms")]
    pub default_polling_interval_ms: u64,

    /// Shortest interval a subscriber may request
    ///
    /// Default: 10
    #[serde(default = "default_min_polling_interval_ms")]
    pub min_polling_interval_ms: u64,

    /// Capacity of channels created on behalf of subscribers
    ///
    /// Default: 16
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_polling_interval_ms() -> u64 {
    1000
}

fn default_min_polling_interval_ms() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    16
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            default_polling_interval_ms: default_polling_interval_ms(),
            min_polling_interval_ms: default_min_polling_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl SubscriptionConfig {
    pub fn default_polling_interval(&self) -> Duration {
        Duration::from_millis(self.default_polling_interval_ms)
    }

    pub fn min_polling_interval(&self) -> Duration {
        Duration::from_millis(self.min_polling_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_polling_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "subscription.min_polling_interval_ms must be greater than 0".into(),
            )));
        }
        if self.default_polling_interval_ms < self.min_polling_interval_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "subscription.default_polling_interval_ms ({}) must be at least min_polling_interval_ms ({})",
                self.default_polling_interval_ms, self.min_polling_interval_ms
            ))));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "subscription.channel_capacity must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}
