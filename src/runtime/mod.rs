//! Thin runtime layer: task spawning plus the message-passing primitives
//! the pool's actor uses to talk to its handles.

pub(crate) mod acknowledged_message;
pub(crate) mod worker_handle;

use std::future::Future;

use tokio::task::JoinHandle;

/// Spawn a future onto the Tokio runtime, detached from its caller.
pub(crate) fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fut)
}
