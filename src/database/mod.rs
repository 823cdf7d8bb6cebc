//! The attribute database.
//!
//! [`AttributeDatabase`] owns the root of an attribute tree, hands out
//! [`DatabaseQuery`]s, serializes Set calls and tracks the polling
//! subscriptions running on behalf of its queries.

mod subscription;

pub use subscription::*;


use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::metrics::register_custom_metrics;
use crate::AttributeDbConfig;
use crate::AttributeGroup;
use crate::AttributeGroupQuery;
use crate::AttributeValueMap;
use crate::Error;
use crate::Path;
use crate::QueryId;
use crate::Result;
use crate::ResultGroup;
use crate::SubscriptionConfig;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

type SubscriptionRegistry = Arc<DashMap<SubscriptionId, QueryId>>;

pub struct AttributeDatabase {
    root: AttributeGroup,
    config: AttributeDbConfig,
    refresh_limit: Arc<Semaphore>,
    set_lock: Mutex<()>,
    subscriptions: SubscriptionRegistry,
}

impl AttributeDatabase {
    /// Validates `config` and wraps the tree rooted at `root`.
    pub fn new(
        root: AttributeGroup,
        config: AttributeDbConfig,
    ) -> Result<Self> {
        let config = config.validate()?;
        register_custom_metrics();
        info!(
            "attribute database ready: {} parallel refreshes, cache policy {:?}",
            config.executor.max_parallel_refreshes, config.cache.policy_type
        );
        Ok(Self {
            root,
            refresh_limit: Arc::new(Semaphore::new(config.executor.max_parallel_refreshes)),
            config,
            set_lock: Mutex::new(()),
            subscriptions: Arc::new(DashMap::new()),
        })
    }

    pub fn root(&self) -> &AttributeGroup {
        &self.root
    }

    pub fn config(&self) -> &AttributeDbConfig {
        &self.config
    }

    /// Registers a query for `paths`. Invalid paths fail the whole call.
    pub fn make_query(
        &self,
        paths: Vec<Path>,
    ) -> Result<DatabaseQuery> {
        let query = AttributeGroupQuery::register(self.root.clone(), paths, self.refresh_limit.clone())?;
        Ok(DatabaseQuery {
            query: Arc::new(query),
            subscription_config: self.config.subscription.clone(),
            subscriptions: self.subscriptions.clone(),
        })
    }

    /// Writes `values`. Concurrent Set calls are applied one at a time.
    pub fn set(
        &self,
        values: &AttributeValueMap,
    ) -> Result<()> {
        let _serialized = self.set_lock.lock();
        let paths = values.keys().cloned().collect();
        let query = AttributeGroupQuery::register(self.root.clone(), paths, self.refresh_limit.clone())?;
        query.set(values)
    }

    /// Number of live subscriptions across all queries.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

/// A query registered with an [`AttributeDatabase`].
pub struct DatabaseQuery {
    query: Arc<AttributeGroupQuery>,
    subscription_config: SubscriptionConfig,
    subscriptions: SubscriptionRegistry,
}

impl DatabaseQuery {
    pub fn id(&self) -> QueryId {
        self.query.id()
    }

    pub async fn get(&self) -> (ResultGroup, Result<()>) {
        self.query.get().await
    }

    pub fn query(&self) -> &AttributeGroupQuery {
        &self.query
    }

    /// Starts polling this query every `polling_interval`, delivering results
    /// to `sink`.
    ///
    /// Must be called from within a tokio runtime. The interval has to be
    /// at least the configured minimum.
    pub fn subscribe(
        &self,
        sink: mpsc::Sender<ResultGroup>,
        polling_interval: Duration,
    ) -> Result<SubscriptionHandle> {
        if polling_interval.is_zero() {
            return Err(Error::InvalidArgument("Polling interval must be non-zero.".into()));
        }
        let min = self.subscription_config.min_polling_interval();
        if polling_interval < min {
            return Err(Error::InvalidArgument(format!(
                "Polling interval {polling_interval:?} is below the minimum of {min:?}."
            )));
        }
        let runtime = Handle::try_current()
            .map_err(|e| Error::FailedPrecondition(format!("Subscriptions need a tokio runtime: {e}")))?;

        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.insert(id, self.query.id());
        debug!("query {} gained subscription {}", self.query.id(), id);

        let cancel = CancellationToken::new();
        let task = runtime.spawn({
            let query = self.query.clone();
            let cancel = cancel.clone();
            let registry = self.subscriptions.clone();
            async move {
                run_subscription(id, query, sink, polling_interval, cancel).await;
                registry.remove(&id);
            }
        });
        Ok(SubscriptionHandle::new(id, cancel, task))
    }

    /// Subscribes through a fresh channel sized from configuration, using the
    /// configured default interval unless one is given.
    pub fn subscribe_channel(
        &self,
        polling_interval: Option<Duration>,
    ) -> Result<(SubscriptionHandle, mpsc::Receiver<ResultGroup>)> {
        let (tx, rx) = mpsc::channel(self.subscription_config.channel_capacity);
        let interval = polling_interval.unwrap_or_else(|| self.subscription_config.default_polling_interval());
        let handle = self.subscribe(tx, interval)?;
        Ok((handle, rx))
    }

    /// Live subscriptions of this query.
    pub fn subscription_count(&self) -> usize {
        let id = self.query.id();
        self.subscriptions.iter().filter(|entry| *entry.value() == id).count()
    }
}
