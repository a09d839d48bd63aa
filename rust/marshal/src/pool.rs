//! Worker pool / transform group: a bounded-parallelism map over an input
//! sequence, with an optional order-preserving mode.
//!
//! Shares the index-tagging-plus-sort trick with [`crate::group`]'s
//! `Parallel + Join` mode (per the documented choice that an implementation
//! wanting deterministic positions should tag results with their index)
//! rather than inventing a second ordering mechanism.

use crate::error::{ErrorKind, MarshalError};
use crate::scope::Scope;

use std::sync::Arc;

/// Whether a transform's output is kept in the result set.
pub type Keep = bool;

/// `(scope, input) -> (output, keep, result)`.
pub type Transform<In, Out> = dyn Fn(&Scope, In) -> Result<(Out, Keep), MarshalError> + Send + Sync;

/// A bounded-parallel map. `num_workers` caps how many transforms run
/// concurrently; `0` or negative is rejected rather than silently treated
/// as unbounded, unlike `StoreOptions::workers` in [`crate::group`].
pub struct WorkerPool {
    num_workers: usize,
    transform_in_order: bool,
}

impl WorkerPool {
    /// `num_workers < 1` is reported as `Invalid` rather than panicking, so
    /// callers building the pool from user-configurable input can surface a
    /// normal error.
    pub fn new(num_workers: usize) -> Result<Self, MarshalError> {
        if num_workers < 1 {
            return Err(MarshalError::new(
                ErrorKind::Invalid,
                "worker pool requires numWorkers >= 1",
            ));
        }
        Ok(Self {
            num_workers,
            transform_in_order: false,
        })
    }

    /// Opt into tagging each result with its input index and stable-sorting
    /// the output back into input order.
    pub fn transform_in_order(mut self) -> Self {
        self.transform_in_order = true;
        self
    }

    /// Run `transform` over every item in `inputs`, bounded by
    /// `num_workers` concurrent tasks. Any transform error cancels the
    /// remaining work and is returned wrapped as `Unexpected` (the original
    /// kind is preserved for sticky kinds, per the crate's wrapping rule).
    pub fn run<In, Out>(&self, scope: &Scope, inputs: Vec<In>, transform: Arc<Transform<In, Out>>) -> Result<Vec<Out>, MarshalError>
    where
        In: Send + 'static,
        Out: Send + 'static,
    {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let injector: Arc<crossbeam_deque::Injector<(usize, In)>> = Arc::new(crossbeam_deque::Injector::new());
        for (i, input) in inputs.into_iter().enumerate() {
            injector.push((i, input));
        }
        let child_scope = scope.child();
        let (tx, rx) = crossbeam_channel::unbounded::<(usize, Result<Option<Out>, MarshalError>)>();
        let workers = self.num_workers;

        std::thread::scope(|s| {
            for _ in 0..workers {
                let injector = Arc::clone(&injector);
                let child_scope = child_scope.clone();
                let transform = Arc::clone(&transform);
                let tx = tx.clone();
                s.spawn(move || loop {
                    let task = loop {
                        match injector.steal() {
                            crossbeam_deque::Steal::Success(item) => break Some(item),
                            crossbeam_deque::Steal::Empty => break None,
                            crossbeam_deque::Steal::Retry => continue,
                        }
                    };
                    let (idx, input) = match task {
                        Some(t) => t,
                        None => return,
                    };
                    if let Some(e) = child_scope.err() {
                        let _ = tx.send((idx, Err(e)));
                        continue;
                    }
                    let outcome = match (transform)(&child_scope, input) {
                        Ok((out, true)) => Ok(Some(out)),
                        Ok((_, false)) => Ok(None),
                        Err(e) => {
                            child_scope.cancel();
                            Err(e)
                        }
                    };
                    let _ = tx.send((idx, outcome));
                });
            }
        });
        drop(tx);

        let mut tagged: Vec<(usize, Option<Out>)> = Vec::new();
        let mut first_error: Option<MarshalError> = None;
        for (idx, outcome) in rx {
            match outcome {
                Ok(value) => tagged.push((idx, value)),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e.wrap(ErrorKind::Unexpected, "transform group aborted"));
        }

        if self.transform_in_order {
            tagged.sort_by_key(|(idx, _)| *idx);
        }
        Ok(tagged.into_iter().filter_map(|(_, v)| v).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn rejects_zero_workers() {
        assert_eq!(WorkerPool::new(0).unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn maps_every_kept_item() {
        let pool = WorkerPool::new(4).unwrap();
        let inputs: Vec<i32> = (0..10).collect();
        let transform: Arc<Transform<i32, i32>> = Arc::new(|_scope, x| Ok((x * 2, true)));
        let mut out = pool.run(&Scope::new(), inputs, transform).unwrap();
        out.sort();
        assert_eq!(out, (0..10).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn drops_items_where_keep_is_false() {
        let pool = WorkerPool::new(4).unwrap();
        let inputs: Vec<i32> = (0..10).collect();
        let transform: Arc<Transform<i32, i32>> = Arc::new(|_scope, x| Ok((x, x % 2 == 0)));
        let mut out = pool.run(&Scope::new(), inputs, transform).unwrap();
        out.sort();
        assert_eq!(out, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn transform_in_order_preserves_input_order() {
        let pool = WorkerPool::new(8).unwrap().transform_in_order();
        let inputs: Vec<i32> = (0..50).collect();
        let transform: Arc<Transform<i32, i32>> = Arc::new(|_scope, x| Ok((x, true)));
        let out = pool.run(&Scope::new(), inputs.clone(), transform).unwrap();
        assert_eq!(out, inputs);
    }

    #[test]
    fn transform_error_aborts_job_and_wraps_as_unexpected() {
        let pool = WorkerPool::new(4).unwrap();
        let inputs: Vec<i32> = (0..20).collect();
        let hit_count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hit_count);
        let transform: Arc<Transform<i32, i32>> = Arc::new(move |_scope, x| {
            counter.fetch_add(1, Ordering::SeqCst);
            if x == 5 {
                Err(MarshalError::new(ErrorKind::Invalid, "bad input"))
            } else {
                Ok((x, true))
            }
        });
        let err = pool.run(&Scope::new(), inputs, transform).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn empty_input_returns_empty_output() {
        let pool = WorkerPool::new(2).unwrap();
        let transform: Arc<Transform<i32, i32>> = Arc::new(|_scope, x| Ok((x, true)));
        let out = pool.run(&Scope::new(), Vec::new(), transform).unwrap();
        assert!(out.is_empty());
    }
}
