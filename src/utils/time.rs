use std::time::Instant;
use std::time::SystemTime;

#[cfg(test)]
use mockall::automock;

/// Source of wall-clock time for time-based cache policies.
#[cfg_attr(test, automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// return milliseconds elapsed since `start`
pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
