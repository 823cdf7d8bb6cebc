//! Queries over an attribute tree.
//!
//! An [`AttributeGroupQuery`] is registered against a root group for a list
//! of paths. Registration records, in every group the paths reach, which
//! attributes and child groups the query reads. [`AttributeGroupQuery::get`]
//! then walks those records, refreshes every involved data source once and
//! copies the values into the query's [`ResultGroup`].

mod query_node;
mod result;

pub(crate) use query_node::*;
pub use result::*;


use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::constants::DEFAULT_MAX_PARALLEL_REFRESHES;
use crate::errors::append_if_error;
use crate::format_path;
use crate::group::RegisteredAttribute;
use crate::metrics::DATASOURCE_FLUSH_FAILURES;
use crate::metrics::DATASOURCE_REFRESH_FAILURES;
use crate::metrics::QUERY_GET_COUNTER;
use crate::metrics::QUERY_GET_LATENCY_MS;
use crate::metrics::SET_FAILURES;
use crate::utils::time::elapsed_ms;
use crate::AttributeGroup;
use crate::AttributeValueMap;
use crate::DataSource;
use crate::DataSourceId;
use crate::Error;
use crate::GroupId;
use crate::ManagedAttribute;
use crate::Result;

pub type QueryId = u64;

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

type RefreshBatch = (Arc<dyn DataSource>, Vec<(Arc<ManagedAttribute>, AttributeWriter)>);

pub struct AttributeGroupQuery {
    id: QueryId,
    root: AttributeGroup,
    output: SharedOutput,
    /// Serializes concurrent `get()` calls on this query
    get_lock: tokio::sync::Mutex<()>,
    refresh_limit: Arc<Semaphore>,
}

impl AttributeGroupQuery {
    /// Creates an unregistered query over the tree rooted at `root`.
    ///
    /// Register it with
    /// [`ReadableAttributeGroup::register_query`](crate::ReadableAttributeGroup::register_query).
    pub fn new(root: AttributeGroup) -> Self {
        Self::with_refresh_limit(root, Arc::new(Semaphore::new(DEFAULT_MAX_PARALLEL_REFRESHES)))
    }

    /// Like [`new`](Self::new), with data source refreshes bounded by a
    /// shared semaphore.
    pub fn with_refresh_limit(
        root: AttributeGroup,
        refresh_limit: Arc<Semaphore>,
    ) -> Self {
        Self {
            id: NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed),
            root,
            output: Arc::new(Mutex::new(QueryOutput::new())),
            get_lock: tokio::sync::Mutex::new(()),
            refresh_limit,
        }
    }

    /// Creates a query and registers it for `paths`.
    pub fn register(
        root: AttributeGroup,
        paths: Vec<crate::Path>,
        refresh_limit: Arc<Semaphore>,
    ) -> Result<Self> {
        let query = Self::with_refresh_limit(root, refresh_limit);
        let registered = query.root.acquire_readable().register_query(&query, paths);
        registered.map(|()| query)
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub(crate) fn root_group_id(&self) -> GroupId {
        self.root.id()
    }

    pub(crate) fn root_node(&self) -> QueryNode {
        QueryNode::root(self.output.clone())
    }

    /// Refreshes every data source the query touches and returns a copy of
    /// the output.
    ///
    /// Failing data sources do not stop the others. Their fields are left out
    /// of the result and their errors are aggregated into the returned
    /// status.
    pub async fn get(&self) -> (ResultGroup, Result<()>) {
        let _serialized = self.get_lock.lock().await;
        let started = Instant::now();
        QUERY_GET_COUNTER.inc();

        // Group locks are blocking locks. They are taken and released on a
        // blocking thread, never on a runtime worker.
        let id = self.id;
        let root = self.root.clone();
        let output = self.output.clone();
        let refresh_limit = self.refresh_limit.clone();
        let runtime = Handle::current();
        let polled =
            tokio::task::spawn_blocking(move || refresh_registered(id, &root, &output, refresh_limit, &runtime)).await;

        QUERY_GET_LATENCY_MS.observe(elapsed_ms(started));
        match polled {
            Ok(polled) => polled,
            Err(e) => (self.result(), Err(e.into())),
        }
    }

    /// Writes `values` through the setters of the attributes they select and
    /// flushes every touched data source once.
    ///
    /// Every value is attempted even if an earlier one failed; all failures
    /// are aggregated. Values must be keyed by the exact paths the query was
    /// registered with.
    pub fn set(
        &self,
        values: &AttributeValueMap,
    ) -> Result<()> {
        let mut group_locks = Vec::new();
        let mut errors = Vec::new();
        let mut touched: BTreeMap<DataSourceId, Arc<dyn DataSource>> = BTreeMap::new();

        let traversal = self.root.traverse_query(
            self.id,
            &mut group_locks,
            &mut |registered: &RegisteredAttribute| -> Result<()> {
                match set_attribute(registered, values) {
                    Ok(()) => {
                        let datasource = &registered.entry.datasource;
                        touched.entry(datasource.id()).or_insert_with(|| datasource.clone());
                    }
                    Err(e) => errors.push(e),
                }
                Ok(())
            },
        );
        append_if_error(&mut errors, traversal);

        for datasource in touched.values() {
            if let Err(e) = datasource.lock_and_flush_writes() {
                warn!("data source {} failed to flush writes: {}", datasource.id(), e);
                DATASOURCE_FLUSH_FAILURES.inc();
                errors.push(e);
            }
        }
        drop(group_locks);

        let status = Error::aggregate(errors);
        if status.is_err() {
            SET_FAILURES.inc();
        }
        status
    }

    /// Copy of the current output, without refreshing anything.
    pub fn result(&self) -> ResultGroup {
        self.output.lock().result.clone()
    }

    /// True when the output structure changed since the last
    /// [`clear_updated`](Self::clear_updated).
    pub fn is_updated(&self) -> bool {
        self.output.lock().updated
    }

    pub fn mark_updated(&self) {
        self.output.lock().mark_updated();
    }

    pub fn clear_updated(&self) {
        self.output.lock().updated = false;
    }

    /// Counter of structural output changes. Lets several observers detect
    /// changes independently of the shared updated flag.
    pub(crate) fn generation(&self) -> u64 {
        self.output.lock().generation
    }
}

impl Drop for AttributeGroupQuery {
    fn drop(&mut self) {
        self.root.acquire_readable().unregister_query(self);
    }
}

fn set_attribute(
    registered: &RegisteredAttribute,
    values: &AttributeValueMap,
) -> Result<()> {
    let value = values.get(&registered.query_path).ok_or_else(|| {
        Error::Internal(format!(
            "No value supplied for attribute path \"{}\".",
            format_path(&registered.query_path)
        ))
    })?;
    let attribute = &registered.entry.attribute;
    if !attribute.can_set() {
        return Err(Error::FailedPrecondition(format!(
            "Attribute at \"{}\" cannot be set.",
            format_path(&registered.query_path)
        )));
    }
    attribute.set(value.clone())
}

/// Walks the query top-down, refreshing every data source it reaches once,
/// and copies the output. All group locks stay held until the copy is taken.
fn refresh_registered(
    query_id: QueryId,
    root: &AttributeGroup,
    output: &SharedOutput,
    refresh_limit: Arc<Semaphore>,
    runtime: &Handle,
) -> (ResultGroup, Result<()>) {
    let mut group_locks = Vec::new();
    let mut batches: HashMap<DataSourceId, RefreshBatch> = HashMap::new();
    let traversal = root.traverse_query(
        query_id,
        &mut group_locks,
        &mut |registered: &RegisteredAttribute| -> Result<()> {
            let datasource = &registered.entry.datasource;
            batches
                .entry(datasource.id())
                .or_insert_with(|| (datasource.clone(), Vec::new()))
                .1
                .push((registered.entry.attribute.clone(), registered.writer.clone()));
            Ok(())
        },
    );
    if let Err(e) = traversal {
        drop(group_locks);
        return (output.lock().result.clone(), Err(e));
    }

    trace!("query {} refreshing {} data sources", query_id, batches.len());
    let refreshes = batches
        .into_values()
        .map(|(datasource, attributes)| refresh_datasource(refresh_limit.clone(), datasource, attributes));
    let mut errors = Vec::new();
    for refreshed in runtime.block_on(join_all(refreshes)) {
        if let Err(e) = refreshed {
            DATASOURCE_REFRESH_FAILURES.inc();
            errors.push(e);
        }
    }
    let result = output.lock().result.clone();
    drop(group_locks);
    (result, Error::aggregate(errors))
}

/// Refreshes one data source on the blocking pool and copies its attribute
/// values into the query output while its lock is held.
async fn refresh_datasource(
    refresh_limit: Arc<Semaphore>,
    datasource: Arc<dyn DataSource>,
    attributes: Vec<(Arc<ManagedAttribute>, AttributeWriter)>,
) -> Result<()> {
    let _permit = refresh_limit
        .acquire_owned()
        .await
        .map_err(|e| Error::Internal(format!("Refresh limiter closed: {e}")))?;

    tokio::task::spawn_blocking(move || {
        let (guard, status) = datasource.update_values_and_lock();
        let mut errors = Vec::new();
        match status {
            Ok(()) => {
                for (attribute, writer) in &attributes {
                    append_if_error(&mut errors, writer.write(attribute.value()));
                }
            }
            Err(e) => {
                debug!("clearing {} attributes of data source {}", attributes.len(), datasource.id());
                for (_, writer) in &attributes {
                    writer.clear();
                }
                errors.push(e);
            }
        }
        guard.unlock();
        Error::aggregate(errors)
    })
    .await?
}
