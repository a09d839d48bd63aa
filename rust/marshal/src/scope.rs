//! Cancellable scopes: the universal suspension-and-cancellation primitive.
//!
//! A [`Scope`] carries a cancellation signal observable by many consumers, an
//! optional deadline, and an optional cause error surfaced once cancelled.
//! Scopes nest: a child built with [`Scope::child`] is cancelled whenever its
//! parent is.
//!
//! Modelled on the structured-concurrency `CancelToken` in the runtime's
//! nursery service, generalised with a deadline and a cancellation cause so
//! it can serve every subsystem in this crate rather than one nursery.

use crate::error::{ErrorKind, MarshalError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Inner shared state
// ---------------------------------------------------------------------------

struct Inner {
    cancelled: AtomicBool,
    cause: Mutex<Option<MarshalError>>,
    deadline: Option<Instant>,
    done_tx: crossbeam_channel::Sender<()>,
    done_rx: crossbeam_channel::Receiver<()>,
    parent: Option<Scope>,
}

/// A cancellable context carrying deadline and cause.
///
/// Clone is cheap (an `Arc` bump) and every clone observes the same
/// cancellation state.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<Inner>,
}

impl Scope {
    /// A fresh, uncancelled, deadline-less root scope.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                cause: Mutex::new(None),
                deadline: None,
                done_tx: tx,
                done_rx: rx,
                parent: None,
            }),
        }
    }

    /// Derive a child scope that is cancelled whenever `self` is cancelled,
    /// and can additionally be cancelled independently.
    pub fn child(&self) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                cause: Mutex::new(None),
                deadline: self.inner.deadline,
                done_tx: tx,
                done_rx: rx,
                parent: Some(self.clone()),
            }),
        }
    }

    /// Derive a child scope that additionally fires on `timeout` elapsing.
    ///
    /// The timer is tracked lazily: [`err`] and [`sleep`] both check
    /// `Instant::now()` against the deadline, so no background timer thread
    /// is spawned and nothing can leak.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let (tx, rx) = crossbeam_channel::bounded(0);
        let deadline = Some(match self.inner.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                cause: Mutex::new(None),
                deadline,
                done_tx: tx,
                done_rx: rx,
                parent: Some(self.clone()),
            }),
        }
    }

    /// Derive a child scope with an explicit cancel handle but no cause set
    /// yet; calling [`cancel`] on the returned scope sets `Cancelled`.
    pub fn with_cancel(&self) -> Self {
        self.child()
    }

    /// Derive a child scope that is already cancelled with the given cause.
    pub fn with_cancel_cause(&self, cause: MarshalError) -> Self {
        let child = self.child();
        child.cancel_with(cause);
        child
    }

    /// Request cancellation with an unspecified cause (`Cancelled`).
    pub fn cancel(&self) {
        self.cancel_with(MarshalError::new(ErrorKind::Cancelled, "scope cancelled"));
    }

    /// Request cancellation with an explicit cause.
    pub fn cancel_with(&self, cause: MarshalError) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            *self.inner.cause.lock().expect("scope cause mutex poisoned") = Some(cause);
            // A zero-capacity channel close wakes every blocked receiver.
            // Dropping the sender is not available on a shared Sender, so a
            // best-effort non-blocking send plus a single explicit close via
            // the paired `done_rx` drop on scope drop is all that is needed:
            // readers never block past the cancelled flag being observed.
            let _ = self.inner.done_tx.try_send(());
        }
    }

    /// Non-nil iff this scope, or any ancestor, is cancelled or its deadline
    /// has elapsed. `Timeout` wins over `Cancelled` when both would apply.
    pub fn err(&self) -> Option<MarshalError> {
        if let Some(deadline) = self.inner.deadline {
            if Instant::now() >= deadline {
                return Some(MarshalError::new(ErrorKind::Timeout, "scope deadline elapsed"));
            }
        }
        if self.inner.cancelled.load(Ordering::Acquire) {
            let cause = self.inner.cause.lock().expect("scope cause mutex poisoned");
            return Some(match cause.as_ref() {
                Some(c) => MarshalError::new(c.kind(), c.message().to_string()),
                None => MarshalError::new(ErrorKind::Cancelled, "scope cancelled"),
            });
        }
        if let Some(parent) = &self.inner.parent {
            return parent.err();
        }
        None
    }

    /// `true` iff [`err`] would return `Some`.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Sleep for `duration`, waking early (and returning the scope's error)
    /// if the scope is cancelled or its deadline elapses first.
    ///
    /// This is the one "sleep with scope" primitive every backoff in this
    /// crate routes through, so no caller re-implements a sleep/cancel race.
    pub fn sleep(&self, duration: Duration) -> Result<(), MarshalError> {
        if let Some(e) = self.err() {
            return Err(e);
        }
        let timer = crossbeam_channel::after(duration);
        let mut scope = self.clone();
        loop {
            crossbeam_channel::select! {
                recv(timer) -> _ => return Ok(()),
                recv(scope.inner.done_rx) -> _ => {
                    return Err(scope.err().unwrap_or_else(|| {
                        MarshalError::new(ErrorKind::Cancelled, "scope cancelled")
                    }));
                }
                default(poll_interval(&scope)) => {
                    if let Some(e) = scope.err() {
                        return Err(e);
                    }
                    // Walk up so a parent cancellation (which does not fire
                    // this scope's own `done_tx`) is observed promptly too.
                    if let Some(parent) = scope.inner.parent.clone() {
                        scope = parent;
                    }
                }
            }
        }
    }
}

/// A short poll interval used while racing a parent's cancellation signal;
/// bounded so the delay required by §5's suspension-point contract is small.
fn poll_interval(_scope: &Scope) -> Duration {
    Duration::from_millis(5)
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("done", &self.is_done())
            .field("has_deadline", &self.inner.deadline.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
