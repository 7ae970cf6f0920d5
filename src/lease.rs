//! One-shot handles representing a unit of a slot's concurrency.

use std::ops::Deref;
use std::sync::Arc;

use crate::pool::manager::PoolManager;

/// A handle to one unit of concurrency on a connection.
///
/// Obtained from [`Pool::acquire`](crate::pool::Pool::acquire). Dereferences
/// to the underlying connection. Must be recycled, either explicitly via
/// [`Lease::recycle`] or implicitly on drop, before the slot's concurrency
/// can be reused by another waiter.
pub struct Lease<C> {
    connection: Arc<C>,
    slot_key: usize,
    generation: u64,
    manager: Option<PoolManager<C>>,
}

impl<C> Lease<C> {
    pub(crate) fn new(
        connection: Arc<C>,
        slot_key: usize,
        generation: u64,
        manager: PoolManager<C>,
    ) -> Self {
        Self {
            connection,
            slot_key,
            generation,
            manager: Some(manager),
        }
    }

    /// Recycle this lease, returning its unit of concurrency to the slot and
    /// re-running the pool's match loop.
    ///
    /// Consuming `self` by value makes a double recycle a compile error
    /// rather than a runtime [`ALREADY_RECYCLED`](crate::error::ErrorKind::AlreadyRecycled)
    /// error: there is no second `self` to call this on.
    pub fn recycle(mut self) {
        if let Some(manager) = self.manager.take() {
            manager.recycle(self.slot_key, self.generation);
        }
    }
}

impl<C> Deref for Lease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.connection
    }
}

impl<C> Drop for Lease<C> {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.recycle(self.slot_key, self.generation);
        }
    }
}
