//! Pagination over possibly-unbounded collections.
//!
//! A [`Paginator`] walks a chain of [`Page`]s fetched on demand. A
//! [`StreamPaginator`] adds the dry-up/backoff machinery for pages that
//! signal a *future* page rather than an immediately-available one.
//!
//! The fetcher closure unifies "dynamic" and "static" pages from the
//! specification this crate implements: a page that knows how to fetch its
//! own successor and a page backed by an external API both show up here as
//! `Fn(&Scope) -> Result<Option<Box<dyn Page<T>>>, MarshalError>` — the
//! caller decides what that closure does internally. See DESIGN.md for why
//! the two were unified instead of kept as separate traits.

use crate::error::{ErrorKind, MarshalError};
use crate::scope::Scope;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One page of items of type `T`.
pub trait Page<T>: Send + Sync {
    /// `true` while unvisited items remain in this page.
    fn has_next(&self) -> bool;
    /// Pop and return the next item. Only called when `has_next()` was true.
    fn next(&mut self) -> T;
    /// Number of items originally in this page.
    fn item_count(&self) -> usize;
    /// `true` if this page signals a *future* page rather than one that is
    /// immediately fetchable. Ordinary pages use the default `false`.
    fn has_future(&self) -> bool {
        false
    }
}

/// Fetches the successor to the current page, or `Ok(None)` when no further
/// page exists.
pub type Fetcher<T> = Arc<dyn Fn(&Scope) -> Result<Option<Box<dyn Page<T>>>, MarshalError> + Send + Sync>;

/// Iterates items across a chain of pages, fetching the next page lazily.
pub struct Paginator<T> {
    scope: Scope,
    current: Mutex<Box<dyn Page<T>>>,
    fetch_next: Fetcher<T>,
    closed: AtomicBool,
}

impl<T> Paginator<T> {
    pub fn new(scope: Scope, first_page: Box<dyn Page<T>>, fetch_next: Fetcher<T>) -> Self {
        Self {
            scope,
            current: Mutex::new(first_page),
            fetch_next,
            closed: AtomicBool::new(false),
        }
    }

    /// `true` while unvisited items remain in the current page or a
    /// successor page exists.
    pub fn has_next(&self) -> Result<bool, MarshalError> {
        self.check_open()?;
        if let Some(e) = self.scope.err() {
            return Err(e);
        }
        if self.current.lock().expect("page mutex poisoned").has_next() {
            return Ok(true);
        }
        match (self.fetch_next)(&self.scope)? {
            Some(next) => {
                *self.current.lock().expect("page mutex poisoned") = next;
                self.has_next()
            }
            None => Ok(false),
        }
    }

    /// Returns the next item, crossing page boundaries as needed.
    /// `NotFound` iff no further items are reachable.
    pub fn get_next(&self) -> Result<T, MarshalError> {
        self.check_open()?;
        if let Some(e) = self.scope.err() {
            return Err(e);
        }
        loop {
            {
                let mut current = self.current.lock().expect("page mutex poisoned");
                if current.has_next() {
                    return Ok(current.next());
                }
            }
            match (self.fetch_next)(&self.scope)? {
                Some(next) => {
                    *self.current.lock().expect("page mutex poisoned") = next;
                    continue;
                }
                None => return Err(MarshalError::new(ErrorKind::NotFound, "no further items")),
            }
        }
    }

    /// Release resources and mark this paginator closed; subsequent
    /// operations return `Cancelled`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn check_open(&self) -> Result<(), MarshalError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MarshalError::new(ErrorKind::Cancelled, "paginator is closed"));
        }
        Ok(())
    }

    fn current_has_future(&self) -> bool {
        self.current.lock().expect("page mutex poisoned").has_future()
    }
}

/// A [`Paginator`] extended with dry-up and backoff for streams whose next
/// page may not exist yet.
pub struct StreamPaginator<T> {
    base: Paginator<T>,
    last_progress: Mutex<Instant>,
    dry: AtomicBool,
    timeout: Duration,
    backoff: Duration,
}

impl<T> StreamPaginator<T> {
    pub fn new(scope: Scope, first_page: Box<dyn Page<T>>, fetch_next: Fetcher<T>, timeout: Duration, backoff: Duration) -> Self {
        Self {
            base: Paginator::new(scope, first_page, fetch_next),
            last_progress: Mutex::new(Instant::now()),
            dry: AtomicBool::new(false),
            timeout,
            backoff,
        }
    }

    fn note_progress(&self) {
        *self.last_progress.lock().expect("progress mutex poisoned") = Instant::now();
    }

    fn elapsed_since_progress(&self) -> Duration {
        self.last_progress.lock().expect("progress mutex poisoned").elapsed()
    }

    /// Consults the base iterator first; if empty and the current page
    /// signals a future page, behaviour depends on the dry-up flag: not
    /// dry records progress and optimistically returns true (the caller
    /// backs off inside `get_next`); dry checks the elapsed time against
    /// `timeout` before trying to fetch the future page.
    pub fn has_next(&self) -> Result<bool, MarshalError> {
        loop {
            self.base.check_open()?;
            if let Some(e) = self.base.scope.err() {
                return Err(e);
            }
            if self.base.current.lock().expect("page mutex poisoned").has_next() {
                self.note_progress();
                return Ok(true);
            }
            if self.base.current_has_future() {
                if self.dry.load(Ordering::Acquire) {
                    if self.elapsed_since_progress() >= self.timeout {
                        return Ok(false);
                    }
                } else {
                    self.note_progress();
                    return Ok(true);
                }
            }
            match (self.base.fetch_next)(&self.base.scope)? {
                Some(next) => {
                    *self.base.current.lock().expect("page mutex poisoned") = next;
                    continue;
                }
                None => return Ok(false),
            }
        }
    }

    /// Calls the base `get_next`; on `NotFound`, re-queries `has_next` and,
    /// if true, sleeps for `backoff` (interruptible by scope cancellation)
    /// before retrying.
    pub fn get_next(&self) -> Result<T, MarshalError> {
        loop {
            match self.base.get_next() {
                Ok(item) => {
                    self.note_progress();
                    return Ok(item);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if self.has_next()? {
                        self.base.scope.sleep(self.backoff)?;
                        continue;
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sets the dry-up flag; once set it stays set.
    pub fn dry_up(&self) {
        self.dry.store(true, Ordering::Release);
    }

    pub fn is_running_dry(&self) -> bool {
        self.dry.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.base.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct VecPage {
        items: Vec<i32>,
        pos: usize,
        future: bool,
    }

    impl Page<i32> for VecPage {
        fn has_next(&self) -> bool {
            self.pos < self.items.len()
        }
        fn next(&mut self) -> i32 {
            let v = self.items[self.pos];
            self.pos += 1;
            v
        }
        fn item_count(&self) -> usize {
            self.items.len()
        }
        fn has_future(&self) -> bool {
            self.future
        }
    }

    fn page(items: Vec<i32>) -> Box<VecPage> {
        Box::new(VecPage { items, pos: 0, future: false })
    }

    #[test]
    fn iterates_across_fetched_pages_in_order() {
        let remaining = Arc::new(Mutex::new(vec![vec![3, 4], vec![5]]));
        let fetcher: Fetcher<i32> = {
            let remaining = Arc::clone(&remaining);
            Arc::new(move |_scope| {
                let mut remaining = remaining.lock().unwrap();
                if remaining.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(page(remaining.remove(0)) as Box<dyn Page<i32>>))
                }
            })
        };
        let paginator = Paginator::new(Scope::new(), page(vec![1, 2]), fetcher);

        let mut collected = Vec::new();
        while paginator.has_next().unwrap() {
            collected.push(paginator.get_next().unwrap());
        }
        assert_eq!(collected, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn get_next_returns_not_found_when_exhausted() {
        let fetcher: Fetcher<i32> = Arc::new(|_scope| Ok(None));
        let paginator = Paginator::new(Scope::new(), page(vec![1]), fetcher);
        assert_eq!(paginator.get_next().unwrap(), 1);
        let err = paginator.get_next().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn closed_paginator_reports_cancelled() {
        let fetcher: Fetcher<i32> = Arc::new(|_scope| Ok(None));
        let paginator = Paginator::new(Scope::new(), page(vec![1]), fetcher);
        paginator.close();
        assert_eq!(paginator.get_next().unwrap_err().kind(), ErrorKind::Cancelled);
        assert_eq!(paginator.has_next().unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn stream_backs_off_then_delivers_future_item() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let first = Box::new(VecPage { items: vec![1], pos: 0, future: true });
        let counter = Arc::clone(&delivered);
        let fetcher: Fetcher<i32> = Arc::new(move |_scope| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                // First poll: future page not ready yet.
                Ok(None)
            } else {
                Ok(Some(Box::new(VecPage { items: vec![2], pos: 0, future: false }) as Box<dyn Page<i32>>))
            }
        });
        let stream = StreamPaginator::new(Scope::new(), first, fetcher, Duration::from_secs(5), Duration::from_millis(5));

        assert_eq!(stream.get_next().unwrap(), 1);
        assert_eq!(stream.get_next().unwrap(), 2);
    }

    #[test]
    fn dry_up_eventually_stops_after_timeout() {
        let first = Box::new(VecPage { items: vec![], pos: 0, future: true });
        let fetcher: Fetcher<i32> = Arc::new(|_scope| Ok(Some(Box::new(VecPage { items: vec![], pos: 0, future: true }) as Box<dyn Page<i32>>)));
        let stream = StreamPaginator::new(Scope::new(), first, fetcher, Duration::from_millis(20), Duration::from_millis(1));
        stream.dry_up();
        assert!(stream.is_running_dry());
        std::thread::sleep(Duration::from_millis(30));
        assert!(!stream.has_next().unwrap());
    }

    #[test]
    fn scope_cancellation_during_backoff_surfaces_scope_error() {
        let first = page(vec![1]);
        let fetcher: Fetcher<i32> = Arc::new(|_scope| Ok(None));
        let scope = Scope::new();
        let stream = StreamPaginator::new(scope.clone(), first, fetcher, Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(stream.get_next().unwrap(), 1);
        scope.cancel();
        let err = stream.get_next().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
