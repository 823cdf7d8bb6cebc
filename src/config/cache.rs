use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicyType {
    #[default]
    NoCache,
    TimedCache,
    FetchOnce,
    NeverUpdate,
}

/// Cache policy selection, as consumed by
/// [`CachePolicyFactory`](crate::CachePolicyFactory).
///
/// ```toml
/// [cache]
/// policy_type = "timed_cache"
/// timed_cache_value_secs = 5
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CachePolicyConfig {
    #[serde(default)]
    pub policy_type: CachePolicyType,

    /// Lifetime of cached values for `timed_cache`, in seconds
    ///
    /// Default: 1
    #[serde(default = "default_timed_cache_value_secs")]
    pub timed_cache_value_secs: u64,
}

fn default_timed_cache_value_secs() -> u64 {
    1
}

impl Default for CachePolicyConfig {
    fn default() -> Self {
        Self {
            policy_type: CachePolicyType::default(),
            timed_cache_value_secs: default_timed_cache_value_secs(),
        }
    }
}

impl CachePolicyConfig {
    pub fn timed(secs: u64) -> Self {
        Self {
            policy_type: CachePolicyType::TimedCache,
            timed_cache_value_secs: secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.policy_type == CachePolicyType::TimedCache && self.timed_cache_value_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "cache.timed_cache_value_secs must be greater than 0 for timed_cache".into(),
            )));
        }
        Ok(())
    }
}
