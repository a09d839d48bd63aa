//! Execution groups: a registry of callables run together under a chosen
//! scheduling discipline and error-aggregation policy.
//!
//! The registration/execution split and the one-shot gate are modelled on
//! the runtime's structured-concurrency `Nursery` (spawn now, join later,
//! cancel siblings on first error), generalised to three scheduling modes
//! and a configurable error policy instead of always-parallel-with-first-
//! error.
//!
//! Rust's type system makes a "nil registered element" or a "nil executor"
//! unrepresentable — `Element` is a non-nullable trait object — so the
//! `Undefined: function element` edge case named in the spec this crate
//! implements cannot occur here; the invariant is enforced structurally
//! instead of at runtime.

use crate::error::{join_all, MarshalError};
use crate::scope::Scope;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

/// A unit of work registered into an [`ExecutionGroup`].
///
/// Stored as `Arc<dyn Fn>` rather than `Box<dyn FnOnce>` for two reasons:
/// `OnlyOnce` elements may be asked to run again across repeated `execute`
/// calls (the one-shot gate decides, not the closure), and [`clone_group`]
/// shares the same underlying callable between the original and the clone.
pub type Element = Arc<dyn Fn(&Scope) -> Result<(), MarshalError> + Send + Sync>;

/// Wrap an `Fn` closure as an [`Element`].
pub fn element<F>(f: F) -> Element
where
    F: Fn(&Scope) -> Result<(), MarshalError> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Scheduling discipline for an [`ExecutionGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduling {
    Parallel,
    Sequential,
    SequentialInReverse,
}

/// What to do when an element returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFirstError {
    /// Short-circuit: stop running further elements.
    Stop,
    /// Keep running every remaining element.
    ExecuteAll,
}

/// How multiple element errors are aggregated into the group's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    /// Remember only the first error encountered.
    FirstError,
    /// Aggregate every non-nil error.
    Join,
}

/// Whether a registered element may run more than once across repeated
/// `execute` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteTimes {
    OnlyOnce,
    AnyTimes,
}

/// Whether a successful run clears the registration list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterExecute {
    Clear,
    Retain,
}

/// Configuration for an [`ExecutionGroup`].
///
/// `Stop` and `Join` are mutually exclusive (selecting one clears the
/// other); `workers > 0` implies `Parallel`; `SequentialInReverse` implies
/// `Sequential`. The `parallel`/`sequential`/`sequential_in_reverse`
/// constructors enforce these invariants at construction time rather than
/// leaving them to be violated ad hoc.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    scheduling: Scheduling,
    workers: usize,
    on_first_error: OnFirstError,
    error_mode: ErrorMode,
    execute_times: ExecuteTimes,
    after_execute: AfterExecute,
}

impl StoreOptions {
    /// Bounded-parallel options: `workers == 0` means one worker per task.
    pub fn parallel(workers: usize) -> Self {
        Self {
            scheduling: Scheduling::Parallel,
            workers,
            on_first_error: OnFirstError::Stop,
            error_mode: ErrorMode::FirstError,
            execute_times: ExecuteTimes::AnyTimes,
            after_execute: AfterExecute::Retain,
        }
    }

    /// Sequential, forward order.
    pub fn sequential() -> Self {
        Self {
            scheduling: Scheduling::Sequential,
            workers: 0,
            on_first_error: OnFirstError::Stop,
            error_mode: ErrorMode::FirstError,
            execute_times: ExecuteTimes::AnyTimes,
            after_execute: AfterExecute::Retain,
        }
    }

    /// Sequential, reverse order.
    pub fn sequential_in_reverse() -> Self {
        Self {
            scheduling: Scheduling::SequentialInReverse,
            ..Self::sequential()
        }
    }

    pub fn with_on_first_error(mut self, v: OnFirstError) -> Self {
        self.on_first_error = v;
        if matches!(v, OnFirstError::Stop) {
            self.error_mode = ErrorMode::FirstError;
        }
        self
    }

    pub fn with_error_mode(mut self, v: ErrorMode) -> Self {
        self.error_mode = v;
        if matches!(v, ErrorMode::Join) {
            self.on_first_error = OnFirstError::ExecuteAll;
        }
        self
    }

    pub fn with_execute_times(mut self, v: ExecuteTimes) -> Self {
        self.execute_times = v;
        self
    }

    pub fn with_after_execute(mut self, v: AfterExecute) -> Self {
        self.after_execute = v;
        self
    }

    pub fn scheduling(&self) -> Scheduling {
        self.scheduling
    }

    fn effective_workers(&self, len: usize) -> usize {
        if self.workers == 0 {
            len.max(1)
        } else {
            self.workers.min(len.max(1))
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::sequential()
    }
}

// ---------------------------------------------------------------------------
// Wrapped element — one-shot gate
// ---------------------------------------------------------------------------

/// Pairs an [`Element`] with a one-shot atomic gate used to enforce
/// `ExecuteTimes::OnlyOnce`. [`ExecutionGroup::clone_group`] resets the gate
/// by constructing a fresh wrapper around the same underlying `Arc`.
struct Wrapped {
    element: Element,
    fired: AtomicBool,
    gated: bool,
}

impl Wrapped {
    fn new(element: Element, gated: bool) -> Self {
        Self {
            element,
            fired: AtomicBool::new(false),
            gated,
        }
    }

    fn fresh_clone(&self) -> Self {
        Self {
            element: Arc::clone(&self.element),
            fired: AtomicBool::new(false),
            gated: self.gated,
        }
    }

    fn run(&self, scope: &Scope) -> Result<(), MarshalError> {
        if self.gated && self.fired.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        (self.element)(scope)
    }
}

// ---------------------------------------------------------------------------
// ExecutionGroup
// ---------------------------------------------------------------------------

/// A mutable ordered registry of callables executed together.
///
/// Registrations append at the tail and become visible to the next
/// `execute`. Reads (`len`) may proceed concurrently; `register` and the
/// full span of `execute` take the write lock, matching §5's shared-
/// resource policy — concurrent registrations during a run are serialised
/// behind the run rather than racing it.
pub struct ExecutionGroup {
    options: StoreOptions,
    elements: RwLock<Vec<Arc<Wrapped>>>,
}

impl ExecutionGroup {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            elements: RwLock::new(Vec::new()),
        }
    }

    /// Append elements to the tail of the registration list.
    pub fn register(&self, elements: Vec<Element>) {
        let gated = matches!(self.options.execute_times, ExecuteTimes::OnlyOnce);
        let mut guard = self.elements.write().expect("registration lock poisoned");
        for e in elements {
            guard.push(Arc::new(Wrapped::new(e, gated)));
        }
    }

    /// Current registration count.
    pub fn len(&self) -> usize {
        self.elements.read().expect("registration lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered element under the configured scheduling and
    /// error policy. Clears the registration list iff `after_execute ==
    /// Clear` and no error was produced.
    pub fn execute(&self, scope: &Scope) -> Result<(), MarshalError> {
        let guard = self.elements.write().expect("registration lock poisoned");
        if let Some(e) = scope.err() {
            return Err(e);
        }

        let result = match self.options.scheduling {
            Scheduling::Parallel => self.execute_parallel(scope, &guard),
            Scheduling::Sequential => self.execute_sequential(scope, &guard, false),
            Scheduling::SequentialInReverse => self.execute_sequential(scope, &guard, true),
        };

        let should_clear = result.is_ok() && matches!(self.options.after_execute, AfterExecute::Clear);
        drop(guard);
        if should_clear {
            self.elements.write().expect("registration lock poisoned").clear();
        }

        if let Err(e) = &result {
            tracing::warn!(kind = %e.kind(), scheduling = ?self.options.scheduling, "execution group run failed");
        }
        result
    }

    fn execute_sequential(
        &self,
        scope: &Scope,
        elements: &[Arc<Wrapped>],
        reverse: bool,
    ) -> Result<(), MarshalError> {
        let mut first_error: Option<MarshalError> = None;
        let mut joined: Vec<MarshalError> = Vec::new();

        let indices: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((0..elements.len()).rev())
        } else {
            Box::new(0..elements.len())
        };

        for i in indices {
            if let Some(e) = scope.err() {
                return Err(e);
            }
            match elements[i].run(scope) {
                Ok(()) => {}
                Err(err) => {
                    if err.is_cancelled_or_timeout() {
                        return Err(err);
                    }
                    match self.options.on_first_error {
                        OnFirstError::Stop => return Err(err),
                        OnFirstError::ExecuteAll => match self.options.error_mode {
                            ErrorMode::FirstError => {
                                if first_error.is_none() {
                                    first_error = Some(err);
                                }
                            }
                            ErrorMode::Join => joined.push(err),
                        },
                    }
                }
            }
        }

        if matches!(self.options.error_mode, ErrorMode::Join) {
            return match join_all(joined) {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Work is handed out through a shared [`Injector`](crossbeam_deque::Injector)
    /// to plain, detached `std::thread::spawn` workers rather than
    /// `std::thread::scope` ones: a scope forces a full join of every
    /// spawned thread before it can return, which would make `execute`
    /// behave like `ErrorMode::Join` wall-clock-wise no matter the
    /// configured policy. Detached workers let this function return the
    /// moment a `Stop` policy sees its first error, leaving stragglers to
    /// drain the injector (or notice the now-cancelled scope and skip) on
    /// their own time; their results are simply dropped on the floor once
    /// the receiving end below goes out of scope.
    fn execute_parallel(&self, scope: &Scope, elements: &[Arc<Wrapped>]) -> Result<(), MarshalError> {
        if elements.is_empty() {
            return Ok(());
        }

        let workers = self.options.effective_workers(elements.len());
        let child_scope = scope.child();
        let injector: Arc<crossbeam_deque::Injector<Arc<Wrapped>>> = Arc::new(crossbeam_deque::Injector::new());
        for element in elements.iter().cloned() {
            injector.push(element);
        }
        let (tx, rx) = crossbeam_channel::unbounded::<Result<(), MarshalError>>();
        let on_first_error = self.options.on_first_error;

        for worker in 0..workers {
            let injector = Arc::clone(&injector);
            let child_scope = child_scope.clone();
            let tx = tx.clone();
            std::thread::Builder::new()
                .name(format!("marshal-group-worker-{worker}"))
                .spawn(move || loop {
                    let task = loop {
                        match injector.steal() {
                            crossbeam_deque::Steal::Success(item) => break Some(item),
                            crossbeam_deque::Steal::Empty => break None,
                            crossbeam_deque::Steal::Retry => continue,
                        }
                    };
                    let element = match task {
                        Some(e) => e,
                        None => return,
                    };
                    let outcome = match child_scope.err() {
                        Some(e) => Err(e),
                        None => element.run(&child_scope),
                    };
                    if outcome.is_err() && matches!(on_first_error, OnFirstError::Stop) {
                        child_scope.cancel();
                    }
                    if tx.send(outcome).is_err() {
                        return;
                    }
                })
                .expect("failed to spawn execution group worker thread");
        }
        // Drop our own sender so `rx` disconnects once every detached
        // worker's clone has been dropped, rather than waiting on a join.
        drop(tx);

        let total = elements.len();
        let mut received = 0usize;
        let mut first_error: Option<MarshalError> = None;
        let mut joined: Vec<MarshalError> = Vec::new();

        while received < total {
            match rx.recv() {
                Ok(Ok(())) => received += 1,
                Ok(Err(e)) => {
                    received += 1;
                    if e.is_cancelled_or_timeout() {
                        return Err(e);
                    }
                    match on_first_error {
                        OnFirstError::Stop => return Err(e),
                        OnFirstError::ExecuteAll => match self.options.error_mode {
                            ErrorMode::FirstError => {
                                if first_error.is_none() {
                                    first_error = Some(e);
                                }
                            }
                            ErrorMode::Join => joined.push(e),
                        },
                    }
                }
                Err(_) => break,
            }
        }

        if matches!(self.options.error_mode, ErrorMode::Join) {
            return match join_all(joined) {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Return a new group with identical options and a snapshot of the
    /// current registrations, each re-wrapped with a fresh one-shot gate.
    pub fn clone_group(&self) -> Self {
        let guard = self.elements.read().expect("registration lock poisoned");
        let cloned: Vec<Arc<Wrapped>> = guard.iter().map(|w| Arc::new(w.fresh_clone())).collect();
        Self {
            options: self.options,
            elements: RwLock::new(cloned),
        }
    }
}

impl fmt::Debug for ExecutionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGroup")
            .field("len", &self.len())
            .field("scheduling", &self.options.scheduling)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
