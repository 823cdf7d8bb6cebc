//! Configuration management for the attribute database.
//!
//! Provides layered configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`ATTRDB__` prefix)
//! - Component-wise validation
mod cache;
mod executor;
mod subscription;
pub use cache::*;
pub use executor::*;
pub use subscription::*;
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_ENV_PREFIX;
use crate::Result;

/// Main configuration container for the attribute database
///
/// Sources, later ones overriding earlier ones:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AttributeDbConfig {
    /// Data source refresh fan-out
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Subscription polling parameters
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    /// Default cache policy for data sources built from configuration
    #[serde(default)]
    pub cache: CachePolicyConfig,
}

impl AttributeDbConfig {
    /// Loads configuration from layered sources without validation.
    ///
    /// Callers must call `validate()` once all overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("ATTRDB__EXECUTOR__MAX_PARALLEL_REFRESHES", "4");
    /// let cfg = AttributeDbConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional overrides from `path`, then the environment again.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.executor.validate()?;
        self.subscription.validate()?;
        self.cache.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
