//! Observability events emitted by a [`Pool`](crate::pool::Pool).
//!
//! Every event is also emitted as a `tracing` event at `debug` level (gated
//! behind the `tracing-unstable` feature) regardless of whether a
//! [`PoolEventHandler`] is installed, so a deployment can get observability
//! for free just by wiring up a subscriber, with the typed handler reserved
//! for callers that want to react to specific events programmatically.

use std::sync::Arc;

use crate::slot::Kind;

/// Event emitted when a pool is created.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct PoolCreatedEvent {
    /// The per-kind capacity vector the pool was constructed with.
    pub max_per_kind: Vec<u32>,
}

/// Event emitted when a connect attempt is started for a newly reserved
/// slot.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SlotConnectStartedEvent {
    /// The kind of the slot being connected.
    pub kind: Kind,
}

/// Event emitted when a slot finishes connecting successfully.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SlotConnectSucceededEvent {
    /// The kind of the slot that connected.
    pub kind: Kind,
    /// The concurrency reported by the connector.
    pub concurrency: u32,
    /// The weight reported by the connector.
    pub weight: u32,
}

/// Event emitted when a connect attempt fails.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SlotConnectFailedEvent {
    /// The kind of the slot that failed to connect.
    pub kind: Kind,
}

/// Event emitted when a slot is removed, whether via the connector's
/// `on_remove` signal or via `evict`.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SlotRemovedEvent {
    /// The kind of the slot that was removed.
    pub kind: Kind,
}

/// Event emitted once per `evict` call, after its scan completes.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct PoolEvictedEvent {
    /// The number of slots removed by this call.
    pub count: usize,
}

/// Event emitted once the pool has fully closed, i.e. every in-flight
/// connect has resolved and the close outcome list is complete.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct PoolClosedEvent {
    /// The number of slots present in the close outcome list.
    pub outcomes: usize,
}

/// Observes pool lifecycle events.
///
/// All methods default to no-ops; implement only the events relevant to
/// your use case.
pub trait PoolEventHandler<C>: Send + Sync {
    /// The pool was created.
    fn handle_pool_created_event(&self, _event: PoolCreatedEvent) {}

    /// A connect attempt started.
    fn handle_slot_connect_started_event(&self, _event: SlotConnectStartedEvent) {}

    /// A connect attempt succeeded.
    fn handle_slot_connect_succeeded_event(&self, _event: SlotConnectSucceededEvent) {}

    /// A connect attempt failed.
    fn handle_slot_connect_failed_event(&self, _event: SlotConnectFailedEvent) {}

    /// A slot was removed.
    fn handle_slot_removed_event(&self, _event: SlotRemovedEvent) {}

    /// An `evict` call completed.
    fn handle_pool_evicted_event(&self, _event: PoolEvictedEvent) {}

    /// The pool finished closing.
    fn handle_pool_closed_event(&self, _event: PoolClosedEvent) {}
}

/// Dispatches events to an optional handler and, when the `tracing-unstable`
/// feature is enabled, to `tracing`.
pub(crate) struct Emitter<C> {
    handler: Option<Arc<dyn PoolEventHandler<C>>>,
}

impl<C> Emitter<C> {
    pub(crate) fn new(handler: Option<Arc<dyn PoolEventHandler<C>>>) -> Self {
        Self { handler }
    }

    pub(crate) fn pool_created(&self, max_per_kind: &[u32]) {
        #[cfg(feature = "tracing-unstable")]
        tracing::debug!(target: "core_pool::event", ?max_per_kind, "pool created");

        if let Some(handler) = &self.handler {
            handler.handle_pool_created_event(PoolCreatedEvent {
                max_per_kind: max_per_kind.to_vec(),
            });
        }
    }

    pub(crate) fn slot_connect_started(&self, kind: Kind) {
        #[cfg(feature = "tracing-unstable")]
        tracing::debug!(target: "core_pool::event", kind, "slot connect started");

        if let Some(handler) = &self.handler {
            handler.handle_slot_connect_started_event(SlotConnectStartedEvent { kind });
        }
    }

    pub(crate) fn slot_connect_succeeded(&self, kind: Kind, concurrency: u32, weight: u32) {
        #[cfg(feature = "tracing-unstable")]
        tracing::debug!(target: "core_pool::event", kind, concurrency, weight, "slot connect succeeded");

        if let Some(handler) = &self.handler {
            handler.handle_slot_connect_succeeded_event(SlotConnectSucceededEvent {
                kind,
                concurrency,
                weight,
            });
        }
    }

    pub(crate) fn slot_connect_failed(&self, kind: Kind) {
        #[cfg(feature = "tracing-unstable")]
        tracing::debug!(target: "core_pool::event", kind, "slot connect failed");

        if let Some(handler) = &self.handler {
            handler.handle_slot_connect_failed_event(SlotConnectFailedEvent { kind });
        }
    }

    pub(crate) fn slot_removed(&self, kind: Kind) {
        #[cfg(feature = "tracing-unstable")]
        tracing::debug!(target: "core_pool::event", kind, "slot removed");

        if let Some(handler) = &self.handler {
            handler.handle_slot_removed_event(SlotRemovedEvent { kind });
        }
    }

    pub(crate) fn pool_evicted(&self, count: usize) {
        #[cfg(feature = "tracing-unstable")]
        tracing::debug!(target: "core_pool::event", count, "pool evicted");

        if let Some(handler) = &self.handler {
            handler.handle_pool_evicted_event(PoolEvictedEvent { count });
        }
    }

    pub(crate) fn pool_closed(&self, outcomes: usize) {
        #[cfg(feature = "tracing-unstable")]
        tracing::debug!(target: "core_pool::event", outcomes, "pool closed");

        if let Some(handler) = &self.handler {
            handler.handle_pool_closed_event(PoolClosedEvent { outcomes });
        }
    }
}
