//! Configuration for a [`Pool`](crate::pool::Pool).

use std::sync::Arc;

use derivative::Derivative;
use typed_builder::TypedBuilder;

use crate::event::PoolEventHandler;
use crate::selector::{DefaultSelector, Selector};

/// Options used to construct a [`Pool`](crate::pool::Pool).
///
/// Per-kind capacity is the only required setting; everything else has a
/// sensible default.
#[derive(Derivative, TypedBuilder)]
#[derivative(Debug)]
pub struct PoolOptions<C> {
    /// Capacity vector: `max_per_kind[k]` is the maximum total weight the
    /// pool will hold live for kind `k`. A kind index outside this vector's
    /// bounds may never be acquired.
    pub(crate) max_per_kind: Vec<u32>,

    /// The maximum number of waiters that may be queued at once, across all
    /// kinds. Defaults to the sum of `max_per_kind`.
    #[builder(default, setter(strip_option))]
    pub(crate) max_waiters: Option<u32>,

    /// The selector used to match waiters to eligible slots. Defaults to
    /// [`DefaultSelector`].
    #[derivative(Debug = "ignore")]
    #[builder(default=Arc::new(DefaultSelector::default()) as Arc<dyn Selector<C>>)]
    pub(crate) selector: Arc<dyn Selector<C>>,

    /// An optional observer notified of pool lifecycle events.
    #[derivative(Debug = "ignore")]
    #[builder(default, setter(strip_option))]
    pub(crate) event_handler: Option<Arc<dyn PoolEventHandler<C>>>,
}

impl<C> PoolOptions<C> {
    pub(crate) fn effective_max_waiters(&self) -> u32 {
        self.max_waiters
            .unwrap_or_else(|| self.max_per_kind.iter().sum())
    }
}
