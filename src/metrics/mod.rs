use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;

use crate::constants::METRICS_NAMESPACE;
use crate::Error;
use crate::Result;

lazy_static! {
    pub static ref QUERY_GET_COUNTER: IntCounter = IntCounter::with_opts(
        Opts::new("query_get_total", "Number of query Get calls").namespace(METRICS_NAMESPACE)
    )
    .expect("metric can not be created");

    pub static ref QUERY_GET_LATENCY_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("query_get_latency_ms", "Histogram of query Get latency in ms")
            .namespace(METRICS_NAMESPACE)
            .buckets(exponential_buckets(0.5, 2.0, 14).expect("valid bucket layout"))
    )
    .expect("metric can not be created");

    pub static ref DATASOURCE_REFRESH_FAILURES: IntCounter = IntCounter::with_opts(
        Opts::new("datasource_refresh_failures_total", "Data source refreshes that failed during a Get")
            .namespace(METRICS_NAMESPACE)
    )
    .expect("metric can not be created");

    pub static ref DATASOURCE_FLUSH_FAILURES: IntCounter = IntCounter::with_opts(
        Opts::new("datasource_flush_failures_total", "Data source flushes that failed during a Set")
            .namespace(METRICS_NAMESPACE)
    )
    .expect("metric can not be created");

    pub static ref SET_FAILURES: IntCounter = IntCounter::with_opts(
        Opts::new("set_failures_total", "Set calls that returned an error").namespace(METRICS_NAMESPACE)
    )
    .expect("metric can not be created");

    pub static ref SUBSCRIPTION_UPDATES_SENT: IntCounter = IntCounter::with_opts(
        Opts::new("subscription_updates_sent_total", "Results delivered to subscribers")
            .namespace(METRICS_NAMESPACE)
    )
    .expect("metric can not be created");

    pub static ref SUBSCRIPTION_UPDATES_DROPPED: IntCounter = IntCounter::with_opts(
        Opts::new("subscription_updates_dropped_total", "Results skipped because a subscriber was full")
            .namespace(METRICS_NAMESPACE)
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Registers the crate collectors with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(QUERY_GET_COUNTER.clone()),
            Box::new(QUERY_GET_LATENCY_MS.clone()),
            Box::new(DATASOURCE_REFRESH_FAILURES.clone()),
            Box::new(DATASOURCE_FLUSH_FAILURES.clone()),
            Box::new(SET_FAILURES.clone()),
            Box::new(SUBSCRIPTION_UPDATES_SENT.clone()),
            Box::new(SUBSCRIPTION_UPDATES_DROPPED.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!("could not register collector: {}", e);
            }
        }
    });
}

/// Renders [`REGISTRY`] in the Prometheus text exposition format.
pub fn gather_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("could not encode metrics: {e}")))?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics are not valid utf-8: {e}")))
}
