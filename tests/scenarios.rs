//! End-to-end scenarios exercising the pool's admission, matching, eviction
//! and close semantics against an in-memory test `Connector`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::{mpsc, oneshot};

use core_pool::connector::{Connected, Connector, SlotHandle};
use core_pool::error::{ErrorKind, Result};
use core_pool::{Pool, PoolOptions, WaiterId, WaiterListener};

/// A connector whose every `connect` call resolves immediately with a
/// distinct connection value ("C0", "C1", ...) in call order.
struct CountingConnector {
    next: AtomicU64,
    concurrency: u32,
}

impl CountingConnector {
    fn new(concurrency: u32) -> Self {
        Self {
            next: AtomicU64::new(0),
            concurrency,
        }
    }
}

#[async_trait]
impl Connector for CountingConnector {
    type Connection = String;

    async fn connect(&self, _handle: SlotHandle<String>) -> Result<Connected<String>> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(Connected::new(format!("C{n}"), self.concurrency))
    }
}

/// A connector like [`CountingConnector`], but that also hands every
/// connect's [`SlotHandle`] out over a channel so a test can drive
/// `report_removed`/`report_concurrency_changed` for it later.
struct CapturingConnector {
    next: AtomicU64,
    concurrency: u32,
    handles: mpsc::UnboundedSender<SlotHandle<String>>,
}

impl CapturingConnector {
    fn new(concurrency: u32) -> (Self, mpsc::UnboundedReceiver<SlotHandle<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                next: AtomicU64::new(0),
                concurrency,
                handles: tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl Connector for CapturingConnector {
    type Connection = String;

    async fn connect(&self, handle: SlotHandle<String>) -> Result<Connected<String>> {
        let _ = self.handles.send(handle);
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(Connected::new(format!("C{n}"), self.concurrency))
    }
}

/// One pending connect attempt, handed to the test instead of being resolved
/// by the connector itself.
struct ConnectRequest {
    slot: SlotHandle<String>,
    resolve: oneshot::Sender<Result<Connected<String>>>,
}

/// A connector that forwards every `connect` call to the test over a
/// channel, letting the test choose exactly when (and how) each attempt
/// resolves.
struct ScriptedConnector {
    tx: mpsc::UnboundedSender<ConnectRequest>,
}

impl ScriptedConnector {
    fn new() -> (Self, mpsc::UnboundedReceiver<ConnectRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Connection = String;

    async fn connect(&self, handle: SlotHandle<String>) -> Result<Connected<String>> {
        let (resolve, await_resolve) = oneshot::channel();
        let _ = self.tx.send(ConnectRequest { slot: handle, resolve });
        match await_resolve.await {
            Ok(result) => result,
            Err(_) => Ok(Connected::new("dropped".to_string(), 1)),
        }
    }
}

#[derive(Debug)]
struct Refused;

impl fmt::Display for Refused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection refused")
    }
}

impl std::error::Error for Refused {}

/// Captures the [`WaiterId`] a waiter was assigned on enqueue, so a test can
/// later target it with `Pool::cancel`.
struct IdCapture {
    tx: Mutex<Option<oneshot::Sender<WaiterId>>>,
}

impl IdCapture {
    fn new() -> (Arc<Self>, oneshot::Receiver<WaiterId>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }
}

impl WaiterListener for IdCapture {
    fn on_enqueue(&self, id: WaiterId) {
        if let Some(tx) = self.tx.lock().unwrap().take() {
            let _ = tx.send(id);
        }
    }
}

// S1 - acquire, recycle, reacquire returns the same connection.
#[tokio::test]
async fn acquire_recycle_reacquire_reuses_the_same_connection() {
    let pool = Pool::new(
        CountingConnector::new(1),
        PoolOptions::builder()
            .max_per_kind(vec![10])
            .max_waiters(10u32)
            .build(),
    );

    let lease = pool.acquire(0).await.unwrap();
    assert_eq!(&*lease, "C0");
    assert_eq!(pool.requests().await, 0);
    lease.recycle();

    let lease = pool.acquire(0).await.unwrap();
    assert_eq!(&*lease, "C0");
    assert_eq!(pool.requests().await, 0, "no second connect attempt");
    lease.recycle();
}

// S2 - concurrency increases unblock queued waiters one at a time.
#[tokio::test]
async fn concurrency_increase_unblocks_queued_waiters() {
    let (connector, mut requests) = ScriptedConnector::new();
    let pool = Pool::new(connector, PoolOptions::builder().max_per_kind(vec![1]).build());

    let pool1 = pool.clone();
    let t1 = tokio::spawn(async move { pool1.acquire(0).await });
    let pool2 = pool.clone();
    let t2 = tokio::spawn(async move { pool2.acquire(0).await });
    let pool3 = pool.clone();
    let t3 = tokio::spawn(async move { pool3.acquire(0).await });

    let req = requests.recv().await.expect("exactly one connect attempt is made");
    let handle = req.slot.clone();
    req.resolve.send(Ok(Connected::new("C".to_string(), 1))).unwrap();

    let lease1 = t1.await.unwrap().unwrap();
    assert_eq!(&*lease1, "C");
    assert!(
        requests.try_recv().is_err(),
        "kind 0's capacity is already exhausted by the one slot"
    );

    handle.report_concurrency_changed(2);
    let lease2 = t2.await.unwrap().unwrap();
    assert_eq!(&*lease2, "C");

    handle.report_concurrency_changed(3);
    let lease3 = t3.await.unwrap().unwrap();
    assert_eq!(&*lease3, "C");

    lease1.recycle();
    lease2.recycle();
    lease3.recycle();
}

// S3 - a connect failure frees its kind's capacity and lets a waiter of a
// different kind proceed, without retrying the failed attempt.
#[tokio::test]
async fn connect_failure_frees_capacity_for_a_different_kind() {
    let (connector, mut requests) = ScriptedConnector::new();
    let pool = Pool::new(
        connector,
        PoolOptions::builder()
            .max_per_kind(vec![1, 2])
            .max_waiters(2u32)
            .build(),
    );

    let pool_a = pool.clone();
    let a = tokio::spawn(async move { pool_a.acquire(0).await });
    let req_a = requests.recv().await.expect("connect attempt for waiter A");

    let pool_b = pool.clone();
    let b = tokio::spawn(async move { pool_b.acquire(1).await });
    let req_b = requests.recv().await.expect("connect attempt for waiter B");

    req_a.resolve.send(Err(core_pool::Error::connect_failed(Refused))).unwrap();
    let err = a.await.unwrap().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::ConnectFailed { .. }));

    // Kind 0's reservation was released; kind 1's reservation (still
    // connecting) remains.
    assert_eq!(pool.capacity().await, 1);

    req_b.resolve.send(Ok(Connected::new("E".to_string(), 1))).unwrap();
    let lease_b = b.await.unwrap().unwrap();
    assert_eq!(&*lease_b, "E");
    lease_b.recycle();
}

// Boundary - a connector reporting a weight above its (default) reserved
// hint can still push a kind over budget once both attempts resolve; the
// pool re-validates and fails whichever connect would exceed it rather
// than silently admitting both.
#[tokio::test]
async fn weight_exceeding_budget_after_connect_fails_the_waiter() {
    let (connector, mut requests) = ScriptedConnector::new();
    let pool = Pool::new(connector, PoolOptions::builder().max_per_kind(vec![5]).build());

    let pool_a = pool.clone();
    let a = tokio::spawn(async move { pool_a.acquire(0).await });
    let req_a = requests.recv().await.expect("connect attempt for A");

    let pool_b = pool.clone();
    let b = tokio::spawn(async move { pool_b.acquire(0).await });
    let req_b = requests.recv().await.expect("connect attempt for B, admitted against the reserved hint");

    req_a
        .resolve
        .send(Ok(Connected::new("C0".to_string(), 1).with_weight(3)))
        .unwrap();
    let lease_a = a.await.unwrap().unwrap();
    assert_eq!(&*lease_a, "C0");

    req_b
        .resolve
        .send(Ok(Connected::new("C1".to_string(), 1).with_weight(3)))
        .unwrap();
    let err = b.await.unwrap().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::ConnectFailed { .. }));

    // Only A's weight (3) counts; B's connection was discarded rather than
    // pushing the kind's total to 6 over a max of 5.
    assert_eq!(pool.capacity().await, 3);

    lease_a.recycle();
}

// S4 - a slot removed out from under an outstanding lease does not get
// reused; a subsequent acquire opens a fresh slot.
#[tokio::test]
async fn remove_then_reacquire_opens_a_new_slot() {
    let (connector, mut handles) = CapturingConnector::new(1);
    let pool = Pool::new(connector, PoolOptions::builder().max_per_kind(vec![1]).build());

    let lease_a = pool.acquire(0).await.unwrap();
    assert_eq!(&*lease_a, "C0");
    let handle_a = handles.recv().await.unwrap();

    handle_a.report_removed();

    let lease_b = pool.acquire(0).await.unwrap();
    assert_eq!(&*lease_b, "C1");

    lease_a.recycle();
    lease_b.recycle();
}

// S5 - evict only ever touches idle, available slots, newest-recycled-first.
#[tokio::test]
async fn evict_only_touches_idle_available_slots() {
    let pool = Pool::new(
        CountingConnector::new(1),
        PoolOptions::builder().max_per_kind(vec![3]).build(),
    );

    let lease0 = pool.acquire(0).await.unwrap();
    let lease1 = pool.acquire(0).await.unwrap();
    let lease2 = pool.acquire(0).await.unwrap();
    assert_eq!(&*lease0, "C0");
    assert_eq!(&*lease1, "C1");
    assert_eq!(&*lease2, "C2");

    lease1.recycle();
    lease2.recycle();

    let touched = Arc::new(Mutex::new(Vec::new()));
    let touched_for_predicate = touched.clone();
    let evicted = pool
        .evict(move |c: &String| {
            touched_for_predicate.lock().unwrap().push(c.clone());
            true
        })
        .await;

    let evicted: Vec<String> = evicted.iter().map(|c| c.as_ref().clone()).collect();
    assert_eq!(evicted, vec!["C2".to_string(), "C1".to_string()]);
    assert_eq!(*touched.lock().unwrap(), vec!["C2".to_string(), "C1".to_string()]);

    lease0.recycle();
}

// S6 - close waits out an in-flight connect before completing; the waiter
// that triggered it observes POOL_CLOSED rather than the connection.
#[tokio::test]
async fn close_waits_for_in_flight_connect_before_completing() {
    let (connector, mut requests) = ScriptedConnector::new();
    let pool = Pool::new(connector, PoolOptions::builder().max_per_kind(vec![1]).build());

    let pool_a = pool.clone();
    let a = tokio::spawn(async move { pool_a.acquire(0).await });
    let req = requests.recv().await.expect("connect attempt for A");

    let pool_close = pool.clone();
    let close_task = tokio::spawn(async move { pool_close.close().await });
    tokio::task::yield_now().await;
    // Barrier: by the time this resolves, the close request sent above
    // (on the same channel) has already been fully processed.
    let _ = pool.waiters().await;

    req.resolve.send(Ok(Connected::new("C".to_string(), 1))).unwrap();

    let outcomes = close_task.await.unwrap().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].as_ref().unwrap().as_ref(), "C");

    let err = a.await.unwrap().unwrap_err();
    assert!(err.is_pool_closed());

    let err = pool.acquire(0).await.unwrap_err();
    assert!(err.is_pool_closed());
}

// Boundary - acquiring past max_waiters is rejected with TOO_BUSY.
#[tokio::test]
async fn acquire_beyond_max_waiters_is_rejected() {
    let (connector, mut requests) = ScriptedConnector::new();
    let pool = Pool::new(
        connector,
        PoolOptions::builder()
            .max_per_kind(vec![1])
            .max_waiters(1u32)
            .build(),
    );

    let pool1 = pool.clone();
    let t1 = tokio::spawn(async move { pool1.acquire(0).await });
    let req = requests.recv().await.unwrap();

    let pool2 = pool.clone();
    let t2 = tokio::spawn(async move { pool2.acquire(0).await });
    tokio::task::yield_now().await;
    assert_eq!(pool.waiters().await, 1, "t2 is queued, t1 is already connecting");

    let err = pool.acquire(0).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TooBusy { waiters: 1 }));

    req.resolve.send(Ok(Connected::new("C".to_string(), 1))).unwrap();
    let lease1 = t1.await.unwrap().unwrap();
    lease1.recycle();
    let lease2 = t2.await.unwrap().unwrap();
    lease2.recycle();
}

// Boundary - cancel only succeeds once, for a still-queued waiter.
#[tokio::test]
async fn cancel_only_succeeds_for_still_queued_waiters() {
    let (connector, mut requests) = ScriptedConnector::new();
    let pool = Pool::new(connector, PoolOptions::builder().max_per_kind(vec![1]).build());

    let pool0 = pool.clone();
    let t0 = tokio::spawn(async move { pool0.acquire(0).await });
    let req0 = requests.recv().await.unwrap();
    req0.resolve.send(Ok(Connected::new("C".to_string(), 1))).unwrap();
    let lease0 = t0.await.unwrap().unwrap();

    let (capture, id_rx) = IdCapture::new();
    let pool1 = pool.clone();
    let t1 = tokio::spawn(async move { pool1.acquire_with(0, None, Some(capture)).await });
    let waiter_id = id_rx.await.unwrap();

    assert!(pool.cancel(waiter_id).await);
    assert!(!pool.cancel(waiter_id).await, "cancelling twice returns false");

    // the cancelled waiter's own future still resolves, just not with a lease.
    let _ = t1.await.unwrap();

    lease0.recycle();
}

// Boundary - closing a pool twice fails the second call, on a fresh
// dispatch rather than re-entrantly inside the first.
#[tokio::test]
async fn closing_twice_fails_the_second_call() {
    let pool = Pool::new(
        CountingConnector::new(1),
        PoolOptions::builder().max_per_kind(vec![1]).build(),
    );

    let outcomes = pool.close().await.unwrap();
    assert!(outcomes.is_empty());

    let err = pool.close().await.unwrap_err();
    assert!(err.is_pool_closed());
}

// Boundary - a concurrency decrease below the current lease count revokes
// nothing; the slot only becomes eligible again once enough leases recycle.
#[tokio::test]
async fn concurrency_decrease_does_not_revoke_existing_leases() {
    let (connector, mut requests) = ScriptedConnector::new();
    let pool = Pool::new(connector, PoolOptions::builder().max_per_kind(vec![1]).build());

    let pool_a = pool.clone();
    let a = tokio::spawn(async move { pool_a.acquire(0).await });
    let req = requests.recv().await.unwrap();
    let handle = req.slot.clone();
    req.resolve.send(Ok(Connected::new("C".to_string(), 2))).unwrap();
    let lease_a = a.await.unwrap().unwrap();

    let pool_b = pool.clone();
    let b = tokio::spawn(async move { pool_b.acquire(0).await });
    let lease_b = b.await.unwrap().unwrap();
    assert_eq!(&*lease_b, "C");

    handle.report_concurrency_changed(1);

    let pool_c = pool.clone();
    let c = tokio::spawn(async move { pool_c.acquire(0).await });
    tokio::task::yield_now().await;
    assert_eq!(pool.waiters().await, 1, "used already exceeds the lowered concurrency");

    lease_a.recycle();
    assert_eq!(pool.waiters().await, 1, "used is still not below the lowered concurrency");

    lease_b.recycle();
    let lease_c = c.await.unwrap().unwrap();
    assert_eq!(&*lease_c, "C");
    lease_c.recycle();
}
