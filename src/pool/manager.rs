use tokio::sync::mpsc;

use super::message::{ManagementMessage, SlotEvent};

/// A lightweight, cloneable handle used to post management events into a
/// pool's worker.
///
/// Unlike [`Requester`](super::requester::Requester), holding a
/// `PoolManager` does not keep the worker alive: every [`Lease`](crate::lease::Lease)
/// carries one so it can recycle itself on drop, but the worker shuts down
/// once the last `Requester` (not `PoolManager`) handle is dropped.
pub(crate) struct PoolManager<C> {
    sender: mpsc::UnboundedSender<ManagementMessage<C>>,
}

impl<C> PoolManager<C> {
    pub(crate) fn new(sender: mpsc::UnboundedSender<ManagementMessage<C>>) -> Self {
        Self { sender }
    }

    pub(crate) fn recycle(&self, slot_key: usize, generation: u64) {
        let _ = self
            .sender
            .send(ManagementMessage::Recycle { slot_key, generation });
    }

    #[allow(dead_code)]
    pub(crate) fn slot_event(&self, slot_key: usize, generation: u64, event: SlotEvent) {
        let _ = self.sender.send(ManagementMessage::SlotEvent {
            slot_key,
            generation,
            event,
        });
    }
}

impl<C> Clone for PoolManager<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
