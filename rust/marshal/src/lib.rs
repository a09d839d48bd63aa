//! A concurrency-coordination toolkit: execution groups, sagas, paginators,
//! and graceful process termination, all built on one cancellable [`Scope`]
//! primitive.
//!
//! - [`scope`] — the cancellable, deadline-aware context every other
//!   module suspends and checks against.
//! - [`error`] — the closed error taxonomy ([`error::ErrorKind`]) and
//!   [`error::MarshalError`] shared by every fallible operation here.
//! - [`group`] — [`group::ExecutionGroup`], the callable registry with
//!   configurable scheduling and error policy everything else builds on.
//! - [`compound`] — groups of groups.
//! - [`priority`] — priority-bucketed compound execution.
//! - [`saga`] — forward/compensation orchestration.
//! - [`paginate`] — page and stream iteration with backoff and dry-up.
//! - [`pool`] — bounded-parallelism transform groups.
//! - [`process`] — cross-platform process observation and graceful
//!   termination.
//! - [`config`] — crate-wide default constants.
//! - [`telemetry`] — `tracing` subscriber setup.

pub mod compound;
pub mod config;
pub mod error;
pub mod group;
pub mod paginate;
pub mod pool;
pub mod priority;
pub mod process;
pub mod saga;
pub mod scope;
pub mod telemetry;

pub use compound::{CompoundExecutionGroup, Executable};
pub use error::{ErrorChain, ErrorKind, MarshalError};
pub use group::{
    element, AfterExecute, Element, ErrorMode, ExecuteTimes, ExecutionGroup, OnFirstError, Scheduling, StoreOptions,
};
pub use paginate::{Fetcher, Page, Paginator, StreamPaginator};
pub use pool::{Keep, Transform, WorkerPool};
pub use priority::{BucketOptions, PriorityExecutionGroup, DEFAULT_PRIORITY};
pub use process::{
    find_process, list_processes, terminate_gracefully, terminate_gracefully_with_children, wait_for_completion,
    Process, ProcessState, Signal,
};
pub use saga::{ActionArguments, SagaOrchestrator, TransactionStep};
pub use scope::Scope;
