//! The public pool handle and the actor that backs it.

pub(crate) mod manager;
pub(crate) mod message;
pub(crate) mod requester;
pub(crate) mod worker;

use std::sync::Arc;

use crate::connector::Connector;
use crate::error::Result;
use crate::lease::Lease;
use crate::options::PoolOptions;
use crate::selector::Selector;
use crate::slot::{Affinity, Kind};
use crate::waiter::{WaiterId, WaiterListener};

use requester::Requester;
use worker::Worker;

/// A bounded, async pool of long-lived connections that support dynamic
/// per-connection concurrency.
///
/// Cloning a `Pool` is cheap: every clone shares the same underlying worker
/// task, and the worker shuts down once the last clone is dropped.
pub struct Pool<C> {
    requester: Requester<C>,
}

impl<C: Send + Sync + 'static> Pool<C> {
    /// Creates a pool backed by `connector` and spawns its worker task.
    pub fn new<Conn>(connector: Conn, options: PoolOptions<C>) -> Self
    where
        Conn: Connector<Connection = C>,
    {
        let requester = Worker::spawn(options, Arc::new(connector));
        Self { requester }
    }

    /// Acquires a lease on a slot of the given `kind`, connecting a new one
    /// if needed and capacity allows, or waiting in line otherwise.
    pub async fn acquire(&self, kind: Kind) -> Result<Lease<C>> {
        self.requester.acquire(kind, None, None).await
    }

    /// Like [`acquire`](Self::acquire), with an optional affinity hint for
    /// the selector and a listener notified of this request's lifecycle.
    pub async fn acquire_with(
        &self,
        kind: Kind,
        affinity: Option<Affinity>,
        listener: Option<Arc<dyn WaiterListener>>,
    ) -> Result<Lease<C>> {
        self.requester.acquire(kind, affinity, listener).await
    }

    /// Removes every currently idle slot matching `predicate`, returning the
    /// connections that were evicted. Slots with outstanding leases are left
    /// alone and are not offered to `predicate`.
    pub async fn evict(&self, predicate: impl FnMut(&C) -> bool + Send + 'static) -> Vec<Arc<C>> {
        self.requester
            .evict(Box::new(predicate))
            .await
            .unwrap_or_default()
    }

    /// Removes a still-queued waiter from the line. Returns `false` if the
    /// id is unknown or the waiter has already been matched or cancelled.
    pub async fn cancel(&self, waiter: WaiterId) -> bool {
        self.requester.cancel(waiter).await
    }

    /// Closes the pool. Queued waiters are failed immediately; every
    /// connected slot (idle or with outstanding leases) is handed back in
    /// the returned list, and every still-connecting slot is awaited so its
    /// eventual success or failure can be included too. Calling `close`
    /// again returns an error rather than draining a second time.
    pub async fn close(&self) -> Result<Vec<Result<Arc<C>>>> {
        self.requester.close().await
    }

    /// Number of slots not in the `REMOVED` state.
    pub async fn size(&self) -> usize {
        self.requester.stats().await.size
    }

    /// Sum of weights of slots not in the `REMOVED` state.
    pub async fn capacity(&self) -> u64 {
        self.requester.stats().await.capacity
    }

    /// Number of slots currently connecting.
    pub async fn requests(&self) -> usize {
        self.requester.stats().await.requests
    }

    /// Number of waiters currently queued.
    pub async fn waiters(&self) -> usize {
        self.requester.stats().await.waiters
    }

    /// Replaces the pool's matching policy.
    pub fn set_selector(&self, selector: impl Selector<C> + 'static) {
        self.requester.set_selector(Arc::new(selector));
    }
}

impl<C> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            requester: self.requester.clone(),
        }
    }
}
