//! Compound execution groups: treat other execution groups (or anything
//! that runs under a scope and returns a result) as elements of an outer
//! [`ExecutionGroup`].
//!
//! Grounded in the same callable-registry shape as [`crate::group`]; the
//! only addition is a thin adapter that turns a sub-executor into an
//! [`Element`].

use crate::error::MarshalError;
use crate::group::{element, Element, ExecutionGroup, StoreOptions};
use crate::scope::Scope;

use std::sync::Arc;

/// Anything that can be run under a scope and report an aggregated error.
/// Implemented by [`ExecutionGroup`] itself, so groups of groups compose
/// without a special case.
pub trait Executable: Send + Sync {
    fn execute(&self, scope: &Scope) -> Result<(), MarshalError>;
}

impl Executable for ExecutionGroup {
    fn execute(&self, scope: &Scope) -> Result<(), MarshalError> {
        ExecutionGroup::execute(self, scope)
    }
}

/// Wrap any [`Executable`] as an [`Element`] so it can be registered into a
/// compound group alongside plain callables.
pub fn as_element(sub: Arc<dyn Executable>) -> Element {
    element(move |scope| sub.execute(scope))
}

/// A group whose registrations are themselves execution groups (or other
/// executables). Options apply only to the compound layer; each inner
/// group still runs under its own options.
pub struct CompoundExecutionGroup {
    inner: ExecutionGroup,
}

impl CompoundExecutionGroup {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            inner: ExecutionGroup::new(options),
        }
    }

    /// Register one or more sub-executors.
    pub fn register(&self, groups: Vec<Arc<dyn Executable>>) {
        let wrapped: Vec<Element> = groups.into_iter().map(as_element).collect();
        self.inner.register(wrapped);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn execute(&self, scope: &Scope) -> Result<(), MarshalError> {
        self.inner.execute(scope)
    }
}

impl Executable for CompoundExecutionGroup {
    fn execute(&self, scope: &Scope) -> Result<(), MarshalError> {
        CompoundExecutionGroup::execute(self, scope)
    }
}
