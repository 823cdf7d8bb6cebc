//! Data sources.
//!
//! A data source owns a set of [`ManagedAttribute`](crate::ManagedAttribute)s
//! and knows how to refresh them from hardware and how to push staged writes
//! back. Every data source carries a [`CachePolicy`] that decides when a
//! refresh is actually needed, and an exclusive lock that serializes
//! refreshes, flushes and the copying of its attribute values into query
//! results.

mod cache_policy;
mod fixed;

pub use cache_policy::*;
pub use fixed::*;


use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use parking_lot::MutexGuard;
use tracing::debug;

use crate::Result;

pub type DataSourceId = u64;

static NEXT_DATA_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// State shared by every [`DataSource`] implementation: a unique id and the
/// lock-protected cache policy.
pub struct DataSourceCore {
    id: DataSourceId,
    cache: Mutex<Box<dyn CachePolicy>>,
}

impl DataSourceCore {
    pub fn new(cache_policy: Box<dyn CachePolicy>) -> Self {
        Self {
            id: NEXT_DATA_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            cache: Mutex::new(cache_policy),
        }
    }

    pub fn id(&self) -> DataSourceId {
        self.id
    }
}

/// Holds a data source's lock. Dropping it (or calling [`unlock`](Self::unlock))
/// releases the lock.
#[must_use = "the data source is unlocked as soon as the guard is dropped"]
pub struct DataSourceGuard<'a> {
    _cache: MutexGuard<'a, Box<dyn CachePolicy>>,
}

impl DataSourceGuard<'_> {
    pub fn unlock(self) {}
}

pub trait DataSource: Send + Sync + 'static {
    fn core(&self) -> &DataSourceCore;

    /// Reads fresh values from hardware into the owned attributes.
    ///
    /// Only called while the data source lock is held. Implementations must
    /// not acquire it themselves.
    fn update_values(&self) -> Result<()>;

    /// Pushes values staged by attribute setters out to hardware.
    fn flush_writes(&self) -> Result<()> {
        Ok(())
    }

    fn id(&self) -> DataSourceId {
        self.core().id()
    }

    /// Takes the lock and refreshes the attribute values if the cache policy
    /// says they have expired.
    ///
    /// The lock is returned even when the refresh fails so callers always pair
    /// this with exactly one unlock. The cache is only marked fresh after a
    /// successful refresh.
    fn update_values_and_lock(&self) -> (DataSourceGuard<'_>, Result<()>) {
        let mut cache = self.core().cache.lock();
        let status = if cache.cache_has_expired() {
            let status = self.update_values();
            match &status {
                Ok(()) => cache.cache_updated(),
                Err(e) => debug!("data source {} failed to refresh: {}", self.id(), e),
            }
            status
        } else {
            Ok(())
        };
        (DataSourceGuard { _cache: cache }, status)
    }

    fn lock_and_flush_writes(&self) -> Result<()> {
        let _cache = self.core().cache.lock();
        self.flush_writes()
    }

    /// Refreshes without consulting the cache or taking the lock. For use by
    /// implementations that already hold the lock.
    fn update_values_unsafely_without_cache_or_lock(&self) -> Result<()> {
        self.update_values()
    }
}
