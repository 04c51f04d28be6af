//! Cooperative cancellation shared between the caller, the chunk producer
//! and the scan workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why a [`CancelToken`] reports itself as cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CancelReason {
    #[strum(to_string = "cancellation requested")]
    Requested,
    #[strum(to_string = "deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn reason(&self) -> Option<CancelReason> {
        if self.cancelled.load(Ordering::Acquire) {
            return Some(CancelReason::Requested);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(CancelReason::DeadlineExceeded);
        }
        self.parent.as_ref().and_then(|parent| parent.reason())
    }
}

/// A cancellation signal with an optional deadline.
///
/// Clones share the same state. A token created with [`CancelToken::child`]
/// observes its parent's cancellation, but cancelling the child leaves the
/// parent untouched.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create a token that is only cancelled by an explicit [`cancel`](Self::cancel).
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Create a token that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline), None)
    }

    /// Create a token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    fn build(deadline: Option<Instant>, parent: Option<Arc<Inner>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent,
            }),
        }
    }

    /// Derive a token that is cancelled whenever this one is.
    pub fn child(&self) -> Self {
        Self::build(None, Some(Arc::clone(&self.inner)))
    }

    /// Trigger cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// The reason this token is cancelled, or `None` while it is still live.
    ///
    /// An explicit cancel on this token wins over its own deadline, which
    /// wins over anything inherited from a parent.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason()
    }

    /// Time left before the nearest deadline in the parent chain.
    pub fn remaining(&self) -> Option<Duration> {
        let mut nearest: Option<Instant> = None;
        let mut current = Some(&self.inner);
        while let Some(inner) = current {
            if let Some(deadline) = inner.deadline {
                nearest = Some(nearest.map_or(deadline, |n| n.min(deadline)));
            }
            current = inner.parent.as_ref();
        }
        nearest.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
