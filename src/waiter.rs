//! Pending `acquire` requests.

use std::sync::Arc;

use crate::error::Result;
use crate::lease::Lease;
use crate::runtime::acknowledged_message::AcknowledgmentSender;
use crate::slot::{Affinity, Kind};

/// Monotonically increasing identifier for a waiter, scoped to one pool.
/// Used to target `cancel` at a specific queue entry.
pub type WaiterId = u64;

/// Observes lifecycle events of a single `acquire` request.
///
/// Methods default to no-ops so a caller only needs to implement the events
/// it cares about.
pub trait WaiterListener: Send + Sync {
    /// Invoked synchronously once the waiter has been admitted to the queue,
    /// carrying the id a concurrent task can later pass to `Pool::cancel`.
    fn on_enqueue(&self, id: WaiterId) {
        let _ = id;
    }

    /// Invoked when the pool reserves a new slot and begins connecting on
    /// this waiter's behalf.
    fn on_connect_initiated(&self) {}
}

pub(crate) struct Waiter<C> {
    pub(crate) id: WaiterId,
    pub(crate) kind: Kind,
    pub(crate) affinity: Option<Affinity>,
    pub(crate) listener: Option<Arc<dyn WaiterListener>>,
    pub(crate) sink: AcknowledgmentSender<Result<Lease<C>>>,
}
