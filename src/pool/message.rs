//! Internal message types flowing between a [`Pool`](crate::pool::Pool)
//! handle, its worker, and the connector.

use std::sync::Arc;

use crate::connector::Connected;
use crate::error::Result;
use crate::runtime::acknowledged_message::AcknowledgmentSender;
use crate::selector::Selector;
use crate::slot::{Affinity, Kind};
use crate::waiter::{WaiterId, WaiterListener};

/// An out-of-band lifecycle event reported by a connector for a slot it
/// established, via [`SlotHandle`](crate::connector::SlotHandle).
pub(crate) enum SlotEvent {
    Removed,
    ConcurrencyChanged(u32),
}

/// A message posted into the worker's serialization domain, either from a
/// [`PoolManager`](crate::pool::manager::PoolManager) (lease recycle,
/// connector-reported slot events) or from the worker's own spawned connect
/// tasks.
pub(crate) enum ManagementMessage<C> {
    Recycle {
        slot_key: usize,
        generation: u64,
    },
    SlotEvent {
        slot_key: usize,
        generation: u64,
        event: SlotEvent,
    },
    ConnectResult {
        slot_key: usize,
        generation: u64,
        result: Result<Connected<C>>,
    },
}

/// A public operation posted into the worker's serialization domain via a
/// [`Requester`](crate::pool::requester::Requester).
pub(crate) enum Request<C> {
    Acquire {
        kind: Kind,
        affinity: Option<Affinity>,
        listener: Option<Arc<dyn WaiterListener>>,
        sink: AcknowledgmentSender<Result<crate::lease::Lease<C>>>,
    },
    Evict {
        predicate: Box<dyn FnMut(&C) -> bool + Send>,
        sink: AcknowledgmentSender<Vec<Arc<C>>>,
    },
    Cancel {
        waiter_id: WaiterId,
        sink: AcknowledgmentSender<bool>,
    },
    Close {
        sink: AcknowledgmentSender<Result<Vec<Result<Arc<C>>>>>,
    },
    Stats {
        sink: AcknowledgmentSender<Stats>,
    },
    SetSelector {
        selector: Arc<dyn Selector<C>>,
    },
}

/// A snapshot of the pool's observer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of slots not in the `REMOVED` state.
    pub size: usize,
    /// Sum of weights of slots not in the `REMOVED` state.
    pub capacity: u64,
    /// Number of slots currently `CONNECTING`.
    pub requests: usize,
    /// Number of waiters currently queued.
    pub waiters: usize,
}
