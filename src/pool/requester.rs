use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::lease::Lease;
use crate::runtime::acknowledged_message::AcknowledgmentSender;
use crate::runtime::worker_handle::WorkerHandle;
use crate::selector::Selector;
use crate::slot::{Affinity, Kind};
use crate::waiter::{WaiterId, WaiterListener};

use super::message::{Request, Stats};

/// A cloneable handle that posts public operations into a pool's worker and
/// keeps the worker alive for as long as at least one clone survives.
pub(crate) struct Requester<C> {
    sender: mpsc::UnboundedSender<Request<C>>,
    _handle: WorkerHandle,
}

impl<C> Clone for Requester<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            _handle: self._handle.clone(),
        }
    }
}

impl<C> Requester<C> {
    pub(crate) fn new(sender: mpsc::UnboundedSender<Request<C>>, handle: WorkerHandle) -> Self {
        Self {
            sender,
            _handle: handle,
        }
    }

    pub(crate) async fn acquire(
        &self,
        kind: Kind,
        affinity: Option<Affinity>,
        listener: Option<Arc<dyn WaiterListener>>,
    ) -> Result<Lease<C>> {
        let (sink, receiver) = AcknowledgmentSender::channel();
        let request = Request::Acquire {
            kind,
            affinity,
            listener,
            sink,
        };
        if self.sender.send(request).is_err() {
            return Err(Error::pool_closed());
        }
        match receiver.await {
            Some(result) => result,
            None => Err(Error::pool_closed()),
        }
    }

    pub(crate) async fn evict(
        &self,
        predicate: Box<dyn FnMut(&C) -> bool + Send>,
    ) -> Result<Vec<Arc<C>>> {
        let (sink, receiver) = AcknowledgmentSender::channel();
        let request = Request::Evict { predicate, sink };
        if self.sender.send(request).is_err() {
            return Err(Error::pool_closed());
        }
        Ok(receiver.await.unwrap_or_default())
    }

    pub(crate) async fn cancel(&self, waiter_id: WaiterId) -> bool {
        let (sink, receiver) = AcknowledgmentSender::channel();
        let request = Request::Cancel { waiter_id, sink };
        if self.sender.send(request).is_err() {
            return false;
        }
        receiver.await.unwrap_or(false)
    }

    pub(crate) async fn close(&self) -> Result<Vec<Result<Arc<C>>>> {
        let (sink, receiver) = AcknowledgmentSender::channel();
        let request = Request::Close { sink };
        if self.sender.send(request).is_err() {
            return Err(Error::pool_closed());
        }
        match receiver.await {
            Some(result) => result,
            None => Err(Error::pool_closed()),
        }
    }

    pub(crate) async fn stats(&self) -> Stats {
        let (sink, receiver) = AcknowledgmentSender::channel();
        let request = Request::Stats { sink };
        if self.sender.send(request).is_err() {
            return Stats::default();
        }
        receiver.await.unwrap_or_default()
    }

    pub(crate) fn set_selector(&self, selector: Arc<dyn Selector<C>>) {
        let _ = self.sender.send(Request::SetSelector { selector });
    }
}
