//! Crate-wide default constants, collected in one place so callers
//! building options don't have to guess at reasonable values.

use std::time::Duration;

/// Default worker count for `StoreOptions::parallel`/`WorkerPool` when a
/// caller wants "one worker per logical CPU" rather than an explicit count.
pub fn default_worker_count() -> usize {
    num_cpus::get()
}

/// Default backoff between paginator retries and stream poll attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(250);

/// Default grace period for the graceful process terminator.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Default dry-up timeout for a stream paginator once `dry_up()` has been
/// called.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_worker_count_is_at_least_one() {
        assert!(default_worker_count() >= 1);
    }
}
