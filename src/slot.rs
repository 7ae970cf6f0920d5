//! Per-connection state tracked by the pool.

use std::sync::Arc;

use derivative::Derivative;

/// Bucket index into the pool's capacity vector.
///
/// Lets one pool manage heterogeneous resource types with independent caps;
/// a `kind` absent from `max_per_kind` may never be acquired.
pub type Kind = usize;

/// Opaque locality tag a caller may attach to an `acquire` request, and a
/// connector may attach to the slot it establishes. The default selector
/// prefers matching a waiter to a slot sharing its affinity before falling
/// back to any eligible slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Affinity(u64);

impl Affinity {
    /// Construct an affinity tag from an arbitrary caller-chosen value, e.g.
    /// a worker-thread index or a custom locality identifier.
    pub fn new(tag: u64) -> Self {
        Self(tag)
    }
}

impl From<u64> for Affinity {
    fn from(tag: u64) -> Self {
        Self::new(tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Connecting,
    Available,
    Removed,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct Slot<C> {
    pub(crate) kind: Kind,
    pub(crate) weight: u32,
    /// Upper bound on `weight`, reported by the connector before connect
    /// resolves. Counted against the kind's budget in place of `weight`
    /// while still `CONNECTING`, since the real weight isn't known yet.
    pub(crate) reserved_weight: u32,
    pub(crate) concurrency: u32,
    pub(crate) used: u32,
    pub(crate) state: SlotState,
    pub(crate) affinity: Option<Affinity>,
    pub(crate) generation: u64,
    #[derivative(Debug = "ignore")]
    pub(crate) connection: Option<Arc<C>>,
}

impl<C> Slot<C> {
    pub(crate) fn connecting(
        kind: Kind,
        affinity: Option<Affinity>,
        generation: u64,
        reserved_weight: u32,
    ) -> Self {
        Self {
            kind,
            weight: 0,
            reserved_weight,
            concurrency: 0,
            used: 0,
            state: SlotState::Connecting,
            affinity,
            generation,
            connection: None,
        }
    }

    /// Marks this slot removed. Idempotent; returns `true` the first time.
    pub(crate) fn set_removed(&mut self) -> bool {
        if self.state == SlotState::Removed {
            false
        } else {
            self.state = SlotState::Removed;
            true
        }
    }

    pub(crate) fn is_eligible(&self, kind: Kind) -> bool {
        self.state == SlotState::Available && self.kind == kind && self.used < self.concurrency
    }

    /// The weight this slot currently counts against its kind's budget.
    ///
    /// A connector only reports the real weight once connect succeeds, so a
    /// `CONNECTING` slot counts its connector-declared `reserved_weight`
    /// hint until then.
    pub(crate) fn effective_weight(&self) -> u32 {
        match self.state {
            SlotState::Connecting => self.reserved_weight,
            _ => self.weight,
        }
    }

    /// A discarded slot has no outstanding leases and can be purged from the
    /// arena (whether because it was removed, or because a connect failed
    /// and no lease was ever handed out).
    pub(crate) fn is_discardable(&self) -> bool {
        self.state == SlotState::Removed && self.used == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_removed_is_idempotent() {
        let mut slot: Slot<()> = Slot::connecting(0, None, 0, 1);
        slot.state = SlotState::Available;

        assert!(slot.set_removed());
        assert_eq!(slot.state, SlotState::Removed);
        assert!(!slot.set_removed());
    }

    #[test]
    fn eligibility_requires_available_matching_kind_and_spare_concurrency() {
        let mut slot: Slot<()> = Slot::connecting(1, None, 0, 1);
        assert!(!slot.is_eligible(1), "still connecting");

        slot.state = SlotState::Available;
        slot.concurrency = 2;
        assert!(slot.is_eligible(1));
        assert!(!slot.is_eligible(0), "wrong kind");

        slot.used = 2;
        assert!(!slot.is_eligible(1), "no spare concurrency");
    }

    #[test]
    fn effective_weight_is_the_reserved_hint_until_connected() {
        let mut slot: Slot<()> = Slot::connecting(0, None, 0, 3);
        assert_eq!(slot.effective_weight(), 3);

        slot.weight = 5;
        slot.state = SlotState::Available;
        assert_eq!(slot.effective_weight(), 5);
    }

    #[test]
    fn discardable_only_once_removed_and_idle() {
        let mut slot: Slot<()> = Slot::connecting(0, None, 0, 1);
        assert!(!slot.is_discardable());

        slot.used = 1;
        slot.set_removed();
        assert!(!slot.is_discardable(), "lease still outstanding");

        slot.used = 0;
        assert!(slot.is_discardable());
    }
}
