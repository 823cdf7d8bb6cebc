// -
// Configuration

/// Prefix of environment variables overriding configuration (`ATTRDB__...`)
pub(crate) const CONFIG_ENV_PREFIX: &str = "ATTRDB";

/// Data sources refreshed concurrently by one Get when nothing is configured
pub(crate) const DEFAULT_MAX_PARALLEL_REFRESHES: usize = 16;

// -
// Metrics

pub(crate) const METRICS_NAMESPACE: &str = "attrdb";
