use std::fmt;
use std::sync::Arc;

/// A specialized `Result` type for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error returned by the pool.
///
/// This type wraps an [`ErrorKind`] behind a cheaply cloneable handle, since
/// the same failure is often delivered to more than one waiter (e.g. when a
/// connect attempt fails while several waiters are bound to the slot that
/// was attempting it).
#[derive(Clone, Debug)]
pub struct Error {
    kind: Arc<ErrorKind>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self { kind: Arc::new(kind) }
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn pool_closed() -> Self {
        Self::new(ErrorKind::PoolClosed)
    }

    pub(crate) fn too_busy(waiters: usize) -> Self {
        Self::new(ErrorKind::TooBusy { waiters })
    }

    /// Builds a [`ConnectFailed`](ErrorKind::ConnectFailed) error from an
    /// arbitrary cause, for use by [`Connector`](crate::connector::Connector)
    /// implementations that need to fail a connect attempt.
    pub fn connect_failed<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::new(ErrorKind::ConnectFailed {
            cause: Arc::new(cause),
        })
    }

    #[allow(dead_code)]
    pub(crate) fn already_recycled() -> Self {
        Self::new(ErrorKind::AlreadyRecycled)
    }

    /// Returns true if this error indicates the pool has been closed.
    pub fn is_pool_closed(&self) -> bool {
        matches!(*self.kind, ErrorKind::PoolClosed)
    }

    /// Returns true if this error indicates the waiter queue was full.
    pub fn is_too_busy(&self) -> bool {
        matches!(*self.kind, ErrorKind::TooBusy { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.kind {
            ErrorKind::ConnectFailed { cause } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// The category of a pool [`Error`].
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The pool has been closed; no further `acquire`, `evict`, `cancel`, or
    /// `close` calls are serviced.
    #[error("the pool has been closed")]
    PoolClosed,

    /// `acquire` was rejected because admitting it would exceed the
    /// configured maximum number of waiters.
    #[error("the pool is too busy to accept new requests ({waiters} waiters already queued)")]
    TooBusy {
        /// The number of waiters already queued at the time of rejection.
        waiters: usize,
    },

    /// A slot that a waiter was bound to failed to connect.
    #[error("failed to establish a connection: {cause}")]
    ConnectFailed {
        /// The underlying cause reported by the connector.
        cause: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A lease was recycled more than once.
    ///
    /// The safe public API makes this unreachable: `Lease::recycle` consumes
    /// the lease by value, so a second call is a compile error. This variant
    /// exists for completeness and is only ever constructed from internal
    /// bookkeeping that should never trigger in practice.
    #[error("this lease has already been recycled")]
    AlreadyRecycled,
}
