use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use slab::Slab;
use tokio::sync::mpsc;

use crate::connector::{Connected, Connector, SlotHandle};
use crate::error::{Error, Result};
use crate::event::Emitter;
use crate::lease::Lease;
use crate::options::PoolOptions;
use crate::runtime;
use crate::runtime::acknowledged_message::AcknowledgmentSender;
use crate::runtime::worker_handle::WorkerHandleListener;
use crate::selector::{Selector, SlotSnapshot, WaiterView};
use crate::slot::{Affinity, Kind, Slot, SlotState};
use crate::waiter::{Waiter, WaiterId, WaiterListener};

use super::manager::PoolManager;
use super::message::{ManagementMessage, Request, SlotEvent, Stats};
use super::requester::Requester;

/// Reported by the pool itself when a connector signals removal of a slot
/// before its connect attempt completed.
#[derive(Debug, derive_more::Display)]
#[display("the connector reported removal before connect completed")]
struct ConnectorRemoved;

impl std::error::Error for ConnectorRemoved {}

/// Reported when a connector's authoritative weight, known only once
/// connect resolves, would push its kind over its configured maximum --
/// despite having passed admission against the connector's advertised
/// `reserved_weight` hint.
#[derive(Debug, derive_more::Display)]
#[display("the connection's reported weight would exceed its kind's capacity")]
struct WeightExceedsBudget;

impl std::error::Error for WeightExceedsBudget {}

struct PendingClose<C> {
    sink: AcknowledgmentSender<Result<Vec<Result<Arc<C>>>>>,
    outcomes: Vec<Result<Arc<C>>>,
    pending_connects: usize,
}

enum PostAction<C> {
    Lease {
        sink: AcknowledgmentSender<Result<Lease<C>>>,
        result: Result<Lease<C>>,
    },
    Bool {
        sink: AcknowledgmentSender<bool>,
        result: bool,
    },
    Evicted {
        sink: AcknowledgmentSender<Vec<Arc<C>>>,
        result: Vec<Arc<C>>,
    },
    Close {
        sink: AcknowledgmentSender<Result<Vec<Result<Arc<C>>>>>,
        result: Result<Vec<Result<Arc<C>>>>,
    },
    Stats {
        sink: AcknowledgmentSender<Stats>,
        result: Stats,
    },
}

impl<C> PostAction<C> {
    fn fire(self) {
        match self {
            PostAction::Lease { sink, result } => sink.acknowledge(result),
            PostAction::Bool { sink, result } => sink.acknowledge(result),
            PostAction::Evicted { sink, result } => sink.acknowledge(result),
            PostAction::Close { sink, result } => sink.acknowledge(result),
            PostAction::Stats { sink, result } => sink.acknowledge(result),
        }
    }
}

/// The actor task that owns every mutable piece of pool state.
///
/// Every public operation and every connector-reported event funnels through
/// this task's event loop, which is the pool's single logical critical
/// section: all matching, admission, and close/evict bookkeeping happens
/// here, serialized by construction rather than by a lock.
pub(crate) struct Worker<C> {
    connector: Arc<dyn Connector<Connection = C>>,
    max_per_kind: Vec<u32>,
    max_waiters: u32,
    selector: Arc<dyn Selector<C>>,
    emitter: Emitter<C>,

    slots: Slab<Slot<C>>,
    /// Slot keys that are AVAILABLE with used=0, most-recently-idled last.
    /// Drives `evict`'s "newest-recycled-first" traversal order.
    free_order: Vec<usize>,
    /// The waiter bound to a CONNECTING slot, keyed by slot key.
    bound: HashMap<usize, Waiter<C>>,
    queue: VecDeque<Waiter<C>>,
    closed: bool,
    next_generation: u64,
    next_waiter_id: WaiterId,
    pending_close: Option<PendingClose<C>>,

    post_actions: Vec<PostAction<C>>,

    requests: mpsc::UnboundedReceiver<Request<C>>,
    management: mpsc::UnboundedReceiver<ManagementMessage<C>>,
    management_tx: mpsc::UnboundedSender<ManagementMessage<C>>,

    handle_listener: WorkerHandleListener,
}

impl<C> Worker<C>
where
    C: Send + Sync + 'static,
{
    pub(crate) fn spawn(
        options: PoolOptions<C>,
        connector: Arc<dyn Connector<Connection = C>>,
    ) -> Requester<C> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (management_tx, management_rx) = mpsc::unbounded_channel();
        let (handle, listener) = WorkerHandleListener::channel();

        let emitter = Emitter::new(options.event_handler.clone());
        emitter.pool_created(&options.max_per_kind);

        let worker = Worker {
            connector,
            max_waiters: options.effective_max_waiters(),
            max_per_kind: options.max_per_kind,
            selector: options.selector,
            emitter,
            slots: Slab::new(),
            free_order: Vec::new(),
            bound: HashMap::new(),
            queue: VecDeque::new(),
            closed: false,
            next_generation: 0,
            next_waiter_id: 0,
            pending_close: None,
            post_actions: Vec::new(),
            requests: request_rx,
            management: management_rx,
            management_tx,
            handle_listener: listener,
        };

        runtime::spawn(worker.execute());

        Requester::new(request_tx, handle)
    }

    pub(crate) async fn execute(mut self) {
        loop {
            tokio::select! {
                biased;

                Some(msg) = self.management.recv() => {
                    self.handle_management_message(msg);
                    self.drain_post_actions();
                }

                _ = self.handle_listener.wait_for_all_handle_drops() => {
                    break;
                }

                Some(req) = self.requests.recv() => {
                    self.handle_request(req);
                    self.drain_post_actions();
                }

                else => break,
            }
        }
    }

    fn drain_post_actions(&mut self) {
        loop {
            let batch = std::mem::take(&mut self.post_actions);
            if batch.is_empty() {
                break;
            }
            for action in batch {
                action.fire();
            }
        }
    }

    // --- free-list bookkeeping (drives evict's traversal order) ---

    fn mark_idle(&mut self, key: usize) {
        self.free_order.retain(|&k| k != key);
        self.free_order.push(key);
    }

    fn mark_busy(&mut self, key: usize) {
        self.free_order.retain(|&k| k != key);
    }

    // --- request handling ---

    fn handle_request(&mut self, req: Request<C>) {
        match req {
            Request::Acquire {
                kind,
                affinity,
                listener,
                sink,
            } => self.handle_acquire(kind, affinity, listener, sink),
            Request::Evict { predicate, sink } => self.handle_evict(predicate, sink),
            Request::Cancel { waiter_id, sink } => self.handle_cancel(waiter_id, sink),
            Request::Close { sink } => self.handle_close(sink),
            Request::Stats { sink } => self.handle_stats(sink),
            Request::SetSelector { selector } => self.selector = selector,
        }
    }

    fn handle_acquire(
        &mut self,
        kind: Kind,
        affinity: Option<Affinity>,
        listener: Option<Arc<dyn WaiterListener>>,
        sink: AcknowledgmentSender<Result<Lease<C>>>,
    ) {
        if self.closed {
            self.post_actions.push(PostAction::Lease {
                sink,
                result: Err(Error::pool_closed()),
            });
            return;
        }

        if self.queue.len() as u32 >= self.max_waiters {
            let waiters = self.queue.len();
            self.post_actions.push(PostAction::Lease {
                sink,
                result: Err(Error::too_busy(waiters)),
            });
            return;
        }

        let id = self.next_waiter_id;
        self.next_waiter_id += 1;

        if let Some(listener) = &listener {
            listener.on_enqueue(id);
        }

        self.queue.push_back(Waiter {
            id,
            kind,
            affinity,
            listener,
            sink,
        });

        self.run_match_loop();
    }

    fn handle_evict(
        &mut self,
        mut predicate: Box<dyn FnMut(&C) -> bool + Send>,
        sink: AcknowledgmentSender<Vec<Arc<C>>>,
    ) {
        if self.closed {
            self.post_actions.push(PostAction::Evicted {
                sink,
                result: Vec::new(),
            });
            return;
        }

        let candidates: Vec<usize> = self.free_order.iter().rev().copied().collect();
        let mut evicted = Vec::new();

        for key in candidates {
            let matches = match self.slots.get(key) {
                Some(slot) if slot.state == SlotState::Available && slot.used == 0 => {
                    predicate(slot.connection.as_ref().expect("available slot has connection"))
                }
                _ => false,
            };

            if matches {
                let mut slot = self.slots.remove(key);
                slot.set_removed();
                self.emitter.slot_removed(slot.kind);
                self.free_order.retain(|&k| k != key);
                evicted.push(slot.connection.take().expect("available slot has connection"));
            }
        }

        self.emitter.pool_evicted(evicted.len());
        self.post_actions.push(PostAction::Evicted {
            sink,
            result: evicted,
        });
    }

    fn handle_cancel(&mut self, waiter_id: WaiterId, sink: AcknowledgmentSender<bool>) {
        if self.closed {
            self.post_actions.push(PostAction::Bool {
                sink,
                result: false,
            });
            return;
        }

        let result = if let Some(pos) = self.queue.iter().position(|w| w.id == waiter_id) {
            self.queue.remove(pos);
            true
        } else {
            false
        };

        self.post_actions.push(PostAction::Bool { sink, result });
    }

    fn handle_close(&mut self, sink: AcknowledgmentSender<Result<Vec<Result<Arc<C>>>>>) {
        if self.closed {
            self.post_actions.push(PostAction::Close {
                sink,
                result: Err(Error::pool_closed()),
            });
            return;
        }

        self.closed = true;

        while let Some(waiter) = self.queue.pop_front() {
            self.post_actions.push(PostAction::Lease {
                sink: waiter.sink,
                result: Err(Error::pool_closed()),
            });
        }

        let mut outcomes = Vec::new();
        let mut pending_connects = 0usize;
        let keys: Vec<usize> = self.slots.iter().map(|(k, _)| k).collect();

        for key in keys {
            let state = self.slots[key].state;
            match state {
                SlotState::Available => {
                    self.free_order.retain(|&k| k != key);
                    let slot = &mut self.slots[key];
                    let connection = slot.connection.clone().expect("available slot has connection");
                    outcomes.push(Ok(connection));
                    if slot.used == 0 {
                        self.slots.remove(key);
                    } else {
                        slot.set_removed();
                    }
                }
                SlotState::Connecting => {
                    pending_connects += 1;
                }
                SlotState::Removed => {}
            }
        }

        if pending_connects == 0 {
            self.emitter.pool_closed(outcomes.len());
            self.post_actions.push(PostAction::Close {
                sink,
                result: Ok(outcomes),
            });
        } else {
            self.pending_close = Some(PendingClose {
                sink,
                outcomes,
                pending_connects,
            });
        }
    }

    fn handle_stats(&mut self, sink: AcknowledgmentSender<Stats>) {
        let mut size = 0usize;
        let mut capacity = 0u64;
        let mut requests = 0usize;

        for (_, slot) in self.slots.iter() {
            if slot.state != SlotState::Removed {
                size += 1;
                capacity += slot.effective_weight() as u64;
            }
            if slot.state == SlotState::Connecting {
                requests += 1;
            }
        }

        self.post_actions.push(PostAction::Stats {
            sink,
            result: Stats {
                size,
                capacity,
                requests,
                waiters: self.queue.len(),
            },
        });
    }

    // --- management message handling ---

    fn handle_management_message(&mut self, msg: ManagementMessage<C>) {
        match msg {
            ManagementMessage::Recycle {
                slot_key,
                generation,
            } => self.handle_recycle(slot_key, generation),
            ManagementMessage::SlotEvent {
                slot_key,
                generation,
                event,
            } => self.handle_slot_event(slot_key, generation, event),
            ManagementMessage::ConnectResult {
                slot_key,
                generation,
                result,
            } => self.handle_connect_result(slot_key, generation, result),
        }
    }

    fn handle_recycle(&mut self, slot_key: usize, generation: u64) {
        let Some(slot) = self.slots.get_mut(slot_key) else {
            return;
        };
        if slot.generation != generation {
            return;
        }

        if slot.used > 0 {
            slot.used -= 1;
        }

        if slot.state == SlotState::Available && slot.used == 0 {
            self.mark_idle(slot_key);
        }

        if self.slots[slot_key].is_discardable() {
            self.free_order.retain(|&k| k != slot_key);
            self.slots.remove(slot_key);
        }

        self.run_match_loop();
    }

    fn handle_slot_event(&mut self, slot_key: usize, generation: u64, event: SlotEvent) {
        let Some(slot) = self.slots.get_mut(slot_key) else {
            return;
        };
        if slot.generation != generation {
            return;
        }

        match event {
            SlotEvent::Removed => match slot.state {
                SlotState::Connecting => {
                    slot.set_removed();
                    self.emitter.slot_removed(slot.kind);
                    if let Some(waiter) = self.bound.remove(&slot_key) {
                        self.post_actions.push(PostAction::Lease {
                            sink: waiter.sink,
                            result: Err(Error::connect_failed(ConnectorRemoved)),
                        });
                    }
                    self.slots.remove(slot_key);

                    if let Some(pending) = &mut self.pending_close {
                        pending
                            .outcomes
                            .push(Err(Error::connect_failed(ConnectorRemoved)));
                        pending.pending_connects -= 1;
                    }

                    self.run_match_loop();
                }
                SlotState::Available => {
                    if slot.set_removed() {
                        self.emitter.slot_removed(slot.kind);
                    }
                    self.mark_busy(slot_key);
                    if self.slots[slot_key].is_discardable() {
                        self.slots.remove(slot_key);
                    }
                    self.run_match_loop();
                }
                SlotState::Removed => {}
            },
            SlotEvent::ConcurrencyChanged(new) => {
                let old = slot.concurrency;
                slot.concurrency = new;
                if new > old && slot.state == SlotState::Available {
                    self.run_match_loop();
                }
            }
        }

        self.check_pending_close_progress();
    }

    fn handle_connect_result(
        &mut self,
        slot_key: usize,
        generation: u64,
        result: Result<Connected<C>>,
    ) {
        let kind = {
            let Some(slot) = self.slots.get_mut(slot_key) else {
                return;
            };
            if slot.generation != generation {
                return;
            }
            slot.kind
        };

        if self.closed {
            if let Some(waiter) = self.bound.remove(&slot_key) {
                self.post_actions.push(PostAction::Lease {
                    sink: waiter.sink,
                    result: Err(Error::pool_closed()),
                });
            }

            match result {
                Ok(connected) => {
                    self.emitter
                        .slot_connect_succeeded(kind, connected.concurrency, connected.weight);
                    let connection = Arc::new(connected.connection);
                    if let Some(pending) = &mut self.pending_close {
                        pending.outcomes.push(Ok(connection));
                        pending.pending_connects -= 1;
                    }
                }
                Err(err) => {
                    self.emitter.slot_connect_failed(kind);
                    if let Some(pending) = &mut self.pending_close {
                        pending.outcomes.push(Err(err));
                        pending.pending_connects -= 1;
                    }
                }
            }

            self.slots.remove(slot_key);
            self.check_pending_close_progress();
            return;
        }

        match result {
            Ok(connected) => {
                let Connected {
                    connection,
                    concurrency,
                    weight,
                } = connected;

                // The admission check when this connect was started could
                // only reserve `connector.reserved_weight()`, a hint the
                // real weight may not honor. Re-validate against the
                // kind's budget now that the authoritative weight is
                // known, so a connector that under-declares its reserved
                // weight can never push a kind over its max.
                let max = self.max_per_kind.get(kind).copied().unwrap_or(0);
                let committed: u32 = self
                    .slots
                    .iter()
                    .filter(|&(k, s)| {
                        k != slot_key && s.kind == kind && s.state != SlotState::Removed
                    })
                    .map(|(_, s)| s.effective_weight())
                    .sum();

                if committed.saturating_add(weight) > max {
                    self.emitter.slot_connect_failed(kind);
                    self.slots.remove(slot_key);

                    if let Some(waiter) = self.bound.remove(&slot_key) {
                        self.post_actions.push(PostAction::Lease {
                            sink: waiter.sink,
                            result: Err(Error::connect_failed(WeightExceedsBudget)),
                        });
                    }
                } else {
                    let connection = Arc::new(connection);
                    let slot = &mut self.slots[slot_key];
                    slot.weight = weight;
                    slot.concurrency = concurrency;
                    slot.state = SlotState::Available;
                    slot.connection = Some(connection.clone());

                    self.emitter.slot_connect_succeeded(kind, concurrency, weight);

                    if let Some(waiter) = self.bound.remove(&slot_key) {
                        self.slots[slot_key].used += 1;
                        let manager = PoolManager::new(self.management_tx.clone());
                        let lease = Lease::new(connection, slot_key, generation, manager);
                        self.post_actions.push(PostAction::Lease {
                            sink: waiter.sink,
                            result: Ok(lease),
                        });
                    } else if concurrency > 0 {
                        self.mark_idle(slot_key);
                    }
                }

                self.run_match_loop();
            }
            Err(err) => {
                self.emitter.slot_connect_failed(kind);
                if let Some(slot) = self.slots.get_mut(slot_key) {
                    slot.set_removed();
                }
                self.slots.remove(slot_key);

                if let Some(waiter) = self.bound.remove(&slot_key) {
                    self.post_actions.push(PostAction::Lease {
                        sink: waiter.sink,
                        result: Err(err),
                    });
                }

                self.run_match_loop();
            }
        }

        self.check_pending_close_progress();
    }

    fn check_pending_close_progress(&mut self) {
        if matches!(&self.pending_close, Some(pending) if pending.pending_connects == 0) {
            let pending = self.pending_close.take().unwrap();
            self.emitter.pool_closed(pending.outcomes.len());
            self.post_actions.push(PostAction::Close {
                sink: pending.sink,
                result: Ok(pending.outcomes),
            });
        }
    }

    // --- matching ---

    fn can_open_slot(&self, kind: Kind) -> bool {
        let max = self.max_per_kind.get(kind).copied().unwrap_or(0);
        let used: u32 = self
            .slots
            .iter()
            .filter(|(_, s)| s.kind == kind && s.state != SlotState::Removed)
            .map(|(_, s)| s.effective_weight())
            .sum();
        used.saturating_add(self.connector.reserved_weight()) <= max
    }

    fn run_match_loop(&mut self) {
        if self.closed {
            return;
        }

        loop {
            let Some(front) = self.queue.front() else {
                return;
            };
            let kind = front.kind;

            let candidates: Vec<SlotSnapshot> = self
                .slots
                .iter()
                .filter(|(_, s)| s.is_eligible(kind))
                .map(|(key, s)| SlotSnapshot {
                    key,
                    affinity: s.affinity,
                })
                .collect();

            let view = WaiterView {
                kind,
                affinity: front.affinity,
            };

            match self.selector.select(&view, &candidates) {
                Some(slot_key) => {
                    let waiter = self.queue.pop_front().expect("checked non-empty above");
                    let slot = &mut self.slots[slot_key];
                    slot.used += 1;
                    let connection = slot
                        .connection
                        .clone()
                        .expect("eligible slot has a connection");
                    let generation = slot.generation;
                    self.mark_busy(slot_key);

                    let manager = PoolManager::new(self.management_tx.clone());
                    let lease = Lease::new(connection, slot_key, generation, manager);
                    self.post_actions.push(PostAction::Lease {
                        sink: waiter.sink,
                        result: Ok(lease),
                    });
                }
                None if self.can_open_slot(kind) => {
                    let waiter = self.queue.pop_front().expect("checked non-empty above");
                    self.reserve_and_connect(kind, waiter);
                    return;
                }
                None => return,
            }
        }
    }

    fn reserve_and_connect(&mut self, kind: Kind, waiter: Waiter<C>) {
        let generation = self.next_generation;
        self.next_generation += 1;

        if let Some(listener) = &waiter.listener {
            listener.on_connect_initiated();
        }
        self.emitter.slot_connect_started(kind);

        let slot_key = self.slots.insert(Slot::connecting(
            kind,
            waiter.affinity,
            generation,
            self.connector.reserved_weight(),
        ));
        self.bound.insert(slot_key, waiter);

        let handle = SlotHandle::new(slot_key, generation, self.management_tx.clone());
        let connector = self.connector.clone();
        let management_tx = self.management_tx.clone();

        runtime::spawn(async move {
            let result = connector.connect(handle).await;
            let _ = management_tx.send(ManagementMessage::ConnectResult {
                slot_key,
                generation,
                result,
            });
        });
    }
}
