//! Priority execution groups: bucket callables by integer priority and run
//! buckets sequentially, lowest value first, each bucket executing as a
//! `Parallel`-capable inner group.
//!
//! Built on [`crate::compound`]'s group-of-groups adapter: each bucket is a
//! plain [`ExecutionGroup`] and the outer layer is always sequential,
//! regardless of whatever scheduling a caller might otherwise request,
//! because priority ordering would not mean anything under any other
//! discipline.

use crate::compound::{CompoundExecutionGroup, Executable};
use crate::error::{ErrorKind, MarshalError};
use crate::group::{Element, ExecutionGroup, StoreOptions};
use crate::scope::Scope;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Priority `0` is used when no explicit priority is given.
pub const DEFAULT_PRIORITY: u32 = 0;

/// Options for the inner group backing each priority bucket. The outer
/// ordering is always sequential-by-priority; this only governs how each
/// bucket runs its own elements.
#[derive(Debug, Clone, Copy)]
pub struct BucketOptions {
    pub inner: StoreOptions,
}

impl Default for BucketOptions {
    fn default() -> Self {
        Self {
            inner: StoreOptions::parallel(0),
        }
    }
}

/// A priority-bucketed coordinator. Must be built via [`PriorityExecutionGroup::new`];
/// a value produced by zero-initialisation (e.g. `PriorityExecutionGroup::default()`
/// without going through the constructor that records it as initialised) fails
/// `execute` with `Undefined` rather than silently no-op-ing, matching the
/// "priority group without a constructor" edge case.
pub struct PriorityExecutionGroup {
    initialised: bool,
    bucket_options: BucketOptions,
    buckets: RwLock<BTreeMap<u32, Arc<ExecutionGroup>>>,
}

impl PriorityExecutionGroup {
    /// The only supported way to obtain a usable group.
    pub fn new(bucket_options: BucketOptions) -> Self {
        Self {
            initialised: true,
            bucket_options,
            buckets: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register elements at priority 0.
    pub fn register(&self, elements: Vec<Element>) {
        self.register_with_priority(DEFAULT_PRIORITY, elements);
    }

    /// Register elements into the bucket for `priority`, creating it on
    /// demand. Registration succeeds even on an uninitialised group; only
    /// `execute` enforces the constructor requirement.
    pub fn register_with_priority(&self, priority: u32, elements: Vec<Element>) {
        let mut buckets = self.buckets.write().expect("bucket map lock poisoned");
        let bucket = buckets
            .entry(priority)
            .or_insert_with(|| Arc::new(ExecutionGroup::new(self.bucket_options.inner)));
        bucket.register(elements);
    }

    /// Number of distinct priority buckets currently registered.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().expect("bucket map lock poisoned").len()
    }

    /// Run every bucket in ascending priority order as one sequential
    /// compound execution. Cancellation observed before or during a bucket
    /// aborts subsequent buckets.
    pub fn execute(&self, scope: &Scope) -> Result<(), MarshalError> {
        if !self.initialised {
            return Err(MarshalError::new(
                ErrorKind::Undefined,
                "priority execution group not initialised correctly",
            ));
        }
        let buckets = self.buckets.read().expect("bucket map lock poisoned");
        let compound = CompoundExecutionGroup::new(StoreOptions::sequential());
        let ordered: Vec<Arc<dyn Executable>> = buckets
            .values()
            .cloned()
            .map(|b| b as Arc<dyn Executable>)
            .collect();
        compound.register(ordered);
        compound.execute(scope)
    }
}

impl Default for PriorityExecutionGroup {
    /// Produces an uninitialised group: registration succeeds, but
    /// `execute` fails with `Undefined`, per the "priority group without a
    /// constructor" edge case this intentionally preserves.
    fn default() -> Self {
        Self {
            initialised: false,
            bucket_options: BucketOptions::default(),
            buckets: RwLock::new(BTreeMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::element;
    use std::sync::Mutex;

    #[test]
    fn buckets_run_in_ascending_priority_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let group = PriorityExecutionGroup::new(BucketOptions::default());

        for p in [5u32, 1, 3] {
            let order = Arc::clone(&order);
            group.register_with_priority(
                p,
                vec![element(move |_s| {
                    order.lock().unwrap().push(p);
                    Ok(())
                })],
            );
        }
        group.execute(&Scope::new()).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 3, 5]);
    }

    #[test]
    fn register_without_priority_uses_default_zero() {
        let group = PriorityExecutionGroup::new(BucketOptions::default());
        group.register(vec![element(|_s| Ok(()))]);
        assert_eq!(group.bucket_count(), 1);
    }

    #[test]
    fn uninitialised_group_fails_execute_with_undefined() {
        let group = PriorityExecutionGroup::default();
        group.register(vec![element(|_s| Ok(()))]);
        let err = group.execute(&Scope::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Undefined);
    }

    #[test]
    fn cancellation_aborts_subsequent_buckets() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let group = PriorityExecutionGroup::new(BucketOptions::default());
        let scope = Scope::new();

        let scope_for_bucket_0 = scope.clone();
        {
            let ran = Arc::clone(&ran);
            group.register_with_priority(
                0,
                vec![element(move |_s| {
                    ran.lock().unwrap().push(0);
                    scope_for_bucket_0.cancel();
                    Ok(())
                })],
            );
        }
        {
            let ran = Arc::clone(&ran);
            group.register_with_priority(1, vec![element(move |_s| {
                ran.lock().unwrap().push(1);
                Ok(())
            })]);
        }

        let err = group.execute(&scope).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(*ran.lock().unwrap(), vec![0]);
    }
}
