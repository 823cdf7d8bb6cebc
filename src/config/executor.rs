use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_MAX_PARALLEL_REFRESHES;
use crate::Error;
use crate::Result;

/// Bounds the per-data-source refresh fan-out of a Get.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Maximum number of data sources refreshed at the same time
    ///
    /// Default: 16
    #[serde(default = "default_max_parallel_refreshes")]
    pub max_parallel_refreshes: usize,
}

fn default_max_parallel_refreshes() -> usize {
    DEFAULT_MAX_PARALLEL_REFRESHES
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_refreshes: default_max_parallel_refreshes(),
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_refreshes == 0 {
            return Err(Error::Config(ConfigError::Message(
                "executor.max_parallel_refreshes must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}
