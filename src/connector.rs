//! The [`Connector`] trait pools use to establish new connections.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::pool::message::{ManagementMessage, SlotEvent};

/// The outcome of a successful [`Connector::connect`] call.
pub struct Connected<C> {
    /// The established connection, handed to the pool.
    pub connection: C,

    /// The number of simultaneous leases this connection supports at the
    /// moment it was established. May later change via
    /// [`SlotHandle::report_concurrency_changed`].
    pub concurrency: u32,

    /// The capacity cost this connection deducts from its kind's budget.
    /// Reported once, at connect time, and fixed for the slot's lifetime.
    pub weight: u32,
}

impl<C> Connected<C> {
    /// Build a [`Connected`] with `weight` defaulted to 1.
    pub fn new(connection: C, concurrency: u32) -> Self {
        Self {
            connection,
            concurrency,
            weight: 1,
        }
    }

    /// Set an explicit weight.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// Establishes outbound connections on behalf of a pool.
///
/// Implementors report the underlying resource's lifecycle back to the pool
/// through the [`SlotHandle`] passed to `connect`: call
/// [`SlotHandle::report_removed`] when the connection becomes permanently
/// unusable, and [`SlotHandle::report_concurrency_changed`] whenever the
/// number of simultaneous leases the connection can serve changes.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type this connector produces.
    type Connection: Send + Sync + 'static;

    /// Establish a new connection.
    ///
    /// The returned future is driven to completion by the pool itself; the
    /// caller that triggered the connect (by way of a waiter without an
    /// eligible slot) is not involved in polling it.
    async fn connect(&self, handle: SlotHandle<Self::Connection>) -> Result<Connected<Self::Connection>>;

    /// Advisory validity check, consulted by some selectors and eviction
    /// predicates. Defaults to always valid.
    fn is_valid(&self, _connection: &Self::Connection) -> bool {
        true
    }

    /// Upper bound this connector promises never to exceed in the `weight`
    /// of a [`Connected`] it returns. Defaults to 1.
    ///
    /// A `connect` attempt's real weight isn't known until it resolves, so
    /// the pool admits a new attempt against this hint rather than the
    /// connection it hasn't established yet. If a connect ever resolves
    /// with a weight greater than this bound, the pool treats it as a
    /// capacity violation: the connection is discarded and the waiter that
    /// triggered it fails, rather than letting the kind's budget be
    /// silently exceeded.
    fn reserved_weight(&self) -> u32 {
        1
    }
}

/// A handle a [`Connector`] uses to report out-of-band lifecycle events for
/// the slot it is establishing or has established.
///
/// Cloning a `SlotHandle` is cheap; every clone reports events for the same
/// slot. Events reported after the slot has already been discarded (e.g. a
/// stale handle from a connector that keeps a background task running past
/// the connection's removal) are silently ignored by the pool.
pub struct SlotHandle<C> {
    slot_key: usize,
    generation: u64,
    sender: mpsc::UnboundedSender<ManagementMessage<C>>,
}

impl<C> SlotHandle<C> {
    pub(crate) fn new(
        slot_key: usize,
        generation: u64,
        sender: mpsc::UnboundedSender<ManagementMessage<C>>,
    ) -> Self {
        Self {
            slot_key,
            generation,
            sender,
        }
    }

    /// Report that the connection is no longer usable. Existing leases
    /// remain valid; no new lease will be issued against this slot.
    pub fn report_removed(&self) {
        let _ = self.sender.send(ManagementMessage::SlotEvent {
            slot_key: self.slot_key,
            generation: self.generation,
            event: SlotEvent::Removed,
        });
    }

    /// Report a change in the number of simultaneous leases this connection
    /// can serve.
    pub fn report_concurrency_changed(&self, concurrency: u32) {
        let _ = self.sender.send(ManagementMessage::SlotEvent {
            slot_key: self.slot_key,
            generation: self.generation,
            event: SlotEvent::ConcurrencyChanged(concurrency),
        });
    }
}

impl<C> Clone for SlotHandle<C> {
    fn clone(&self) -> Self {
        Self {
            slot_key: self.slot_key,
            generation: self.generation,
            sender: self.sender.clone(),
        }
    }
}
