//! Polling subscriptions.
//!
//! A subscription re-runs a query's Get on a fixed interval and pushes the
//! result into a bounded channel whenever it differs from the last delivered
//! one, or when the query output changed shape. The first result is
//! delivered right away.

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::DropGuard;
use tracing::debug;
use tracing::warn;

use crate::metrics::SUBSCRIPTION_UPDATES_DROPPED;
use crate::metrics::SUBSCRIPTION_UPDATES_SENT;
use crate::AttributeGroupQuery;
use crate::ResultGroup;

pub type SubscriptionId = u64;

/// Keeps a subscription alive. Dropping it stops the polling loop.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    _cancel_on_drop: DropGuard,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub(super) fn new(
        id: SubscriptionId,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            _cancel_on_drop: cancel.drop_guard(),
            task,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// True once the polling loop has ended, e.g. because the receiver was
    /// dropped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the polling loop and waits for it to finish.
    pub async fn cancel(self) {
        let Self {
            id,
            _cancel_on_drop: cancel,
            task,
        } = self;
        drop(cancel);
        if let Err(e) = task.await {
            warn!("subscription {} ended abnormally: {}", id, e);
        }
    }
}

pub(super) async fn run_subscription(
    id: SubscriptionId,
    query: Arc<AttributeGroupQuery>,
    sink: mpsc::Sender<ResultGroup>,
    polling_interval: Duration,
    cancel: CancellationToken,
) {
    debug!(
        "subscription {} polling query {} every {:?}",
        id,
        query.id(),
        polling_interval
    );
    let mut ticker = tokio::time::interval(polling_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_delivered: Option<(ResultGroup, u64)> = None;

    loop {
        select! {
            _ = cancel.cancelled() => break,
            _ = sink.closed() => break,
            _ = ticker.tick() => {}
        }

        let (result, status) = select! {
            _ = cancel.cancelled() => break,
            polled = query.get() => polled,
        };
        if let Err(e) = status {
            warn!("subscription {} polled a partial result: {}", id, e);
        }

        let generation = query.generation();
        if let Some((last, last_generation)) = &last_delivered {
            if *last == result && *last_generation == generation {
                continue;
            }
        }

        match sink.try_send(result.clone()) {
            Ok(()) => {
                SUBSCRIPTION_UPDATES_SENT.inc();
                last_delivered = Some((result, generation));
            }
            Err(TrySendError::Full(_)) => {
                SUBSCRIPTION_UPDATES_DROPPED.inc();
                warn!("subscriber of subscription {} is not keeping up; skipping update", id);
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
    debug!("subscription {} stopped", id);
}
