//! Saga orchestration: a forward sequence of steps paired with a
//! compensation sequence built automatically as the forward steps attempt.
//!
//! Built directly on [`ExecutionGroup`]: the forward group is `Sequential`
//! with `Stop`/`FirstError`; the compensation group is
//! `SequentialInReverse` with `Stop`/`FirstError` and `OnlyOnce`, so the
//! one-shot gate already in [`crate::group`] is what keeps a compensated
//! step from running twice across retries, rather than new machinery.

use crate::error::MarshalError;
use crate::group::{element, ExecutionGroup, ExecuteTimes, StoreOptions};
use crate::scope::Scope;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

// ---------------------------------------------------------------------------
// Action arguments
// ---------------------------------------------------------------------------

/// Shared, effectively-immutable arguments for one saga attempt.
///
/// The idempotency key never changes after construction. The named-value
/// map uses interior mutability so a step can leave state for its own
/// `compensate` without the orchestrator itself needing to expose a mutable
/// API — per the spec this crate implements, arguments are immutable from
/// the orchestrator's perspective even though steps may use the map as a
/// mailbox to themselves.
pub struct ActionArguments {
    idempotency_key: String,
    values: Mutex<HashMap<String, String>>,
}

impl ActionArguments {
    pub fn new(idempotency_key: impl Into<String>) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            values: Mutex::new(HashMap::new()),
        }
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().expect("arguments mutex poisoned").get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .lock()
            .expect("arguments mutex poisoned")
            .insert(key.into(), value.into());
    }

    /// Snapshot into a fresh, independent `ActionArguments` with the same
    /// idempotency key and a copy of the current named values.
    pub fn snapshot(&self) -> Self {
        Self {
            idempotency_key: self.idempotency_key.clone(),
            values: Mutex::new(self.values.lock().expect("arguments mutex poisoned").clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction step
// ---------------------------------------------------------------------------

type StepFn = dyn Fn(&Scope, &ActionArguments) -> Result<(), MarshalError> + Send + Sync;

/// A single forward action paired with its compensation.
pub struct TransactionStep {
    pub namespace: String,
    pub name: String,
    execute_fn: Box<StepFn>,
    compensate_fn: Box<StepFn>,
}

impl TransactionStep {
    pub fn new<E, C>(namespace: impl Into<String>, name: impl Into<String>, execute_fn: E, compensate_fn: C) -> Arc<Self>
    where
        E: Fn(&Scope, &ActionArguments) -> Result<(), MarshalError> + Send + Sync + 'static,
        C: Fn(&Scope, &ActionArguments) -> Result<(), MarshalError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            namespace: namespace.into(),
            name: name.into(),
            execute_fn: Box::new(execute_fn),
            compensate_fn: Box::new(compensate_fn),
        })
    }
}

// ---------------------------------------------------------------------------
// Saga orchestrator
// ---------------------------------------------------------------------------

/// Pairs a forward execution group with a compensation execution group that
/// grows as the forward group attempts each step.
pub struct SagaOrchestrator {
    steps: RwLock<Vec<Arc<TransactionStep>>>,
    args: Arc<ActionArguments>,
    forward: ExecutionGroup,
    compensation: Arc<ExecutionGroup>,
}

fn forward_options() -> StoreOptions {
    StoreOptions::sequential()
}

fn compensation_options() -> StoreOptions {
    StoreOptions::sequential_in_reverse().with_execute_times(ExecuteTimes::OnlyOnce)
}

impl SagaOrchestrator {
    pub fn new(args: ActionArguments) -> Self {
        Self {
            steps: RwLock::new(Vec::new()),
            args: Arc::new(args),
            forward: ExecutionGroup::new(forward_options()),
            compensation: Arc::new(ExecutionGroup::new(compensation_options())),
        }
    }

    /// Append a step to the forward sequence.
    pub fn register(&self, step: Arc<TransactionStep>) {
        self.steps.write().expect("step list lock poisoned").push(Arc::clone(&step));
        self.wire_forward_element(step);
    }

    /// Append a whole sequence of steps, preserving order.
    pub fn register_sequence(&self, sequence: Vec<Arc<TransactionStep>>) {
        for step in sequence {
            self.register(step);
        }
    }

    fn wire_forward_element(&self, step: Arc<TransactionStep>) {
        let args = Arc::clone(&self.args);
        let compensation = Arc::clone(&self.compensation);
        self.forward.register(vec![element(move |scope| {
            let result = (step.execute_fn)(scope, &args);
            // Appended unconditionally: a partially-executed step is still
            // a rollback candidate even when it returned an error.
            let step_for_compensation = Arc::clone(&step);
            let args_for_compensation = Arc::clone(&args);
            compensation.register(vec![element(move |scope| {
                (step_for_compensation.compensate_fn)(scope, &args_for_compensation)
            })]);
            result
        })]);
    }

    /// Run the forward group. On failure, run compensation and return the
    /// two errors joined; a successful forward run never touches
    /// compensation.
    pub fn execute(&self, scope: &Scope) -> Result<(), MarshalError> {
        match self.forward.execute(scope) {
            Ok(()) => Ok(()),
            Err(forward_err) => {
                tracing::warn!(kind = %forward_err.kind(), "saga forward run failed, compensating");
                match self.compensation.execute(scope) {
                    Ok(()) => Err(forward_err),
                    Err(compensation_err) => {
                        tracing::error!(kind = %compensation_err.kind(), "saga compensation also failed");
                        Err(forward_err.join(compensation_err))
                    }
                }
            }
        }
    }

    /// Deep-copy: a fresh orchestrator carrying the same steps (re-wired
    /// onto brand-new forward/compensation groups) and the same argument
    /// instance.
    pub fn clone_saga(&self) -> Self {
        let steps = self.steps.read().expect("step list lock poisoned").clone();
        let clone = Self {
            steps: RwLock::new(Vec::new()),
            args: Arc::clone(&self.args),
            forward: ExecutionGroup::new(forward_options()),
            compensation: Arc::new(ExecutionGroup::new(compensation_options())),
        };
        for step in steps {
            clone.register(step);
        }
        clone
    }

    /// Same forward steps, fresh compensation group and fresh arguments —
    /// for starting a new attempt under a new idempotency key.
    pub fn new_saga(&self, args: ActionArguments) -> Self {
        let steps = self.steps.read().expect("step list lock poisoned").clone();
        let fresh = Self::new(args);
        for step in steps {
            fresh.register(step);
        }
        fresh
    }

    pub fn step_count(&self) -> usize {
        self.steps.read().expect("step list lock poisoned").len()
    }
}
