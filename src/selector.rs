//! Pluggable matching between waiters and eligible slots.

use crate::slot::{Affinity, Kind};

/// A read-only view of one eligible slot, given to the selector.
#[derive(Debug, Clone, Copy)]
pub struct SlotSnapshot {
    /// Internal key identifying this slot; opaque to callers.
    pub key: usize,
    /// The slot's affinity tag, if any, set at connect time.
    pub affinity: Option<Affinity>,
}

/// A read-only view of the waiter being matched.
#[derive(Debug, Clone, Copy)]
pub struct WaiterView {
    /// The waiter's requested kind.
    pub kind: Kind,
    /// The waiter's affinity tag, if any.
    pub affinity: Option<Affinity>,
}

/// Chooses a slot for a waiter from a snapshot of eligible candidates.
///
/// Implementations must be pure: given the same waiter and candidate
/// snapshot, they must return the same answer, and must not mutate pool
/// state. Returning `None` leaves the waiter queued, possibly triggering a
/// new connect attempt if capacity allows.
pub trait Selector<C>: Send + Sync {
    /// Select a slot (by key) for `waiter` from `candidates`, or `None` if
    /// none should be used yet.
    fn select(&self, waiter: &WaiterView, candidates: &[SlotSnapshot]) -> Option<usize>;
}

/// The pool's built-in selector.
///
/// Tie-break order: a slot sharing the waiter's [`Affinity`] first, then the
/// first eligible slot in snapshot order. This collapses the two-step
/// "same context, else same event-loop identity" rule into a single
/// affinity comparison, since Rust's cooperative-scheduling primitives have
/// no separate notion of "context" and "underlying event loop" the way the
/// pool's original environment did.
#[derive(Debug, Default)]
pub struct DefaultSelector {
    _private: (),
}

impl<C> Selector<C> for DefaultSelector {
    fn select(&self, waiter: &WaiterView, candidates: &[SlotSnapshot]) -> Option<usize> {
        if let Some(affinity) = waiter.affinity {
            if let Some(slot) = candidates.iter().find(|s| s.affinity == Some(affinity)) {
                return Some(slot.key);
            }
        }
        candidates.first().map(|s| s.key)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefers_matching_affinity_over_snapshot_order() {
        let selector = DefaultSelector::default();
        let candidates = [
            SlotSnapshot { key: 0, affinity: Some(Affinity::new(1)) },
            SlotSnapshot { key: 1, affinity: Some(Affinity::new(2)) },
        ];
        let waiter = WaiterView { kind: 0, affinity: Some(Affinity::new(2)) };

        assert_eq!(
            Selector::<()>::select(&selector, &waiter, &candidates),
            Some(1)
        );
    }

    #[test]
    fn falls_back_to_first_candidate_without_a_matching_affinity() {
        let selector = DefaultSelector::default();
        let candidates = [
            SlotSnapshot { key: 4, affinity: None },
            SlotSnapshot { key: 5, affinity: Some(Affinity::new(9)) },
        ];
        let waiter = WaiterView { kind: 0, affinity: Some(Affinity::new(1)) };

        assert_eq!(
            Selector::<()>::select(&selector, &waiter, &candidates),
            Some(4)
        );
    }

    #[test]
    fn no_candidates_leaves_the_waiter_unmatched() {
        let selector = DefaultSelector::default();
        let waiter = WaiterView { kind: 0, affinity: None };

        assert_eq!(Selector::<()>::select(&selector, &waiter, &[]), None);
    }
}
