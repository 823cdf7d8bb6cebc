use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::utils::time::Clock;

/// A clock that only moves when told to.
pub(crate) struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
        })
    }

    pub(crate) fn advance(
        &self,
        by: Duration,
    ) {
        *self.now.lock() += by;
    }

    pub(crate) fn rewind(
        &self,
        by: Duration,
    ) {
        *self.now.lock() -= by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock()
    }
}
