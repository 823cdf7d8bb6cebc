use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::config::CachePolicyConfig;
use crate::config::CachePolicyType;
use crate::utils::time::Clock;
use crate::utils::time::SystemClock;
use crate::Error;
use crate::Result;

/// Decides whether a data source must refresh before its values are read.
///
/// Both methods are only called while the owning data source's lock is held.
#[cfg_attr(test, automock)]
pub trait CachePolicy: Send {
    fn cache_has_expired(&mut self) -> bool;

    /// Called after every successful refresh.
    fn cache_updated(&mut self);
}

/// Refreshes on every read.
#[derive(Debug, Default)]
pub struct NoCache;

impl CachePolicy for NoCache {
    fn cache_has_expired(&mut self) -> bool {
        true
    }

    fn cache_updated(&mut self) {}
}

/// Never refreshes. For values that are fixed at construction time.
#[derive(Debug, Default)]
pub struct NeverUpdate;

impl CachePolicy for NeverUpdate {
    fn cache_has_expired(&mut self) -> bool {
        false
    }

    fn cache_updated(&mut self) {}
}

/// Refreshes until the first successful refresh, then never again.
#[derive(Debug)]
pub struct FetchOnce {
    should_update: bool,
}

impl FetchOnce {
    pub fn new() -> Self {
        Self { should_update: true }
    }
}

impl Default for FetchOnce {
    fn default() -> Self {
        Self::new()
    }
}

impl CachePolicy for FetchOnce {
    fn cache_has_expired(&mut self) -> bool {
        self.should_update
    }

    fn cache_updated(&mut self) {
        self.should_update = false;
    }
}

/// Keeps values for a fixed duration after the last refresh.
pub struct TimedCache {
    cache_duration: Duration,
    last_cache_time: Option<SystemTime>,
    clock: Arc<dyn Clock>,
}

impl TimedCache {
    pub fn new(cache_duration: Duration) -> Self {
        Self::with_clock(cache_duration, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cache_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache_duration,
            last_cache_time: None,
            clock,
        }
    }
}

impl CachePolicy for TimedCache {
    fn cache_has_expired(&mut self) -> bool {
        let Some(last) = self.last_cache_time else {
            return true;
        };
        match self.clock.now().duration_since(last) {
            Ok(elapsed) => elapsed > self.cache_duration,
            // The clock went backwards. Treat the cache as stale.
            Err(_) => true,
        }
    }

    fn cache_updated(&mut self) {
        self.last_cache_time = Some(self.clock.now());
    }
}

/// Builds cache policies from configuration.
pub struct CachePolicyFactory;

impl CachePolicyFactory {
    pub fn create_instance(config: &CachePolicyConfig) -> Result<Box<dyn CachePolicy>> {
        Self::create_instance_with_clock(config, Arc::new(SystemClock))
    }

    pub fn create_instance_with_clock(
        config: &CachePolicyConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Box<dyn CachePolicy>> {
        debug!("creating cache policy {:?}", config);
        let policy: Box<dyn CachePolicy> = match config.policy_type {
            CachePolicyType::NoCache => Box::new(NoCache),
            CachePolicyType::NeverUpdate => Box::new(NeverUpdate),
            CachePolicyType::FetchOnce => Box::new(FetchOnce::new()),
            CachePolicyType::TimedCache => {
                if config.timed_cache_value_secs == 0 {
                    return Err(Error::InvalidArgument(
                        "A timed cache policy needs a non-zero timed_cache_value_secs.".into(),
                    ));
                }
                Box::new(TimedCache::with_clock(
                    Duration::from_secs(config.timed_cache_value_secs),
                    clock,
                ))
            }
        };
        Ok(policy)
    }
}
