//! The closed error taxonomy shared by every subsystem in this crate.
//!
//! [`ErrorKind`] is a small, stable enumeration; [`MarshalError`] pairs a kind
//! with a human message and an optional source. Wrapping preserves the
//! innermost kind when it is more specific than `Unexpected` — see
//! [`MarshalError::wrap`].

use std::fmt;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// A closed enumeration of error classifications.
///
/// Kinds are sentinels: callers compare `err.kind()` rather than matching on
/// message text. `#[non_exhaustive]` leaves room to add a kind without a
/// breaking change for callers who already have a wildcard arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    NotImplemented,
    Undefined,
    Invalid,
    NotFound,
    Exists,
    Cancelled,
    Timeout,
    Unauthorised,
    Forbidden,
    Conflict,
    Unavailable,
    Locked,
    StaleLock,
    Empty,
    Eof,
    TooLarge,
    OutOfRange,
    Unexpected,
    Failed,
    Warning,
    Malicious,
    Unsupported,
    Condition,
}

impl ErrorKind {
    /// Kinds that must never be discarded when an error is re-wrapped with a
    /// more generic outer kind (see [`MarshalError::wrap`]).
    fn is_sticky(self) -> bool {
        matches!(
            self,
            ErrorKind::Cancelled | ErrorKind::Timeout | ErrorKind::Warning | ErrorKind::Failed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// MarshalError
// ---------------------------------------------------------------------------

/// The crate-wide error type. Every fallible operation in `marshal` returns
/// `Result<T, MarshalError>`.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct MarshalError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl MarshalError {
    /// Construct a new error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Construct an error wrapping an existing `std::error::Error` source.
    pub fn from_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The classification of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message, without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Re-wrap this error under a new outer kind and message, preserving the
    /// inner kind when it is [`ErrorKind::is_sticky`] and the outer kind is
    /// [`ErrorKind::Unexpected`].
    ///
    /// This is the mechanism behind §3's wrapping rule: a scope-derived
    /// `Cancelled`/`Timeout`, or a `Warning`/`Failed`, is never silently
    /// reclassified as `Unexpected` by an intermediate layer.
    pub fn wrap(self, outer: ErrorKind, message: impl Into<String>) -> Self {
        let kept_kind = if outer == ErrorKind::Unexpected && self.kind.is_sticky() {
            self.kind
        } else {
            outer
        };
        let msg = message.into();
        Self {
            kind: kept_kind,
            message: msg,
            source: Some(Box::new(self)),
        }
    }

    /// `true` iff `kind()` is [`ErrorKind::Cancelled`] or [`ErrorKind::Timeout`].
    pub fn is_cancelled_or_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled | ErrorKind::Timeout)
    }

    /// `true` iff `kind()` is [`ErrorKind::Warning`].
    pub fn is_warning(&self) -> bool {
        self.kind == ErrorKind::Warning
    }

    /// `true` iff `kind()` is [`ErrorKind::Failed`].
    pub fn is_failure(&self) -> bool {
        self.kind == ErrorKind::Failed
    }

    /// Join two errors, preferring `self`'s kind but keeping both messages
    /// and wiring `other` in as the source chain tail. Used by execution
    /// groups and the saga orchestrator to aggregate per-element failures.
    pub fn join(self, other: MarshalError) -> Self {
        let message = format!("{}; {}", self.message, other);
        Self {
            kind: self.kind,
            message,
            source: Some(Box::new(other)),
        }
    }
}

/// Join a non-empty list of errors into one, preserving the first error's
/// kind. Returns `None` if `errors` is empty.
pub fn join_all(mut errors: Vec<MarshalError>) -> Option<MarshalError> {
    if errors.is_empty() {
        return None;
    }
    let first = errors.remove(0);
    Some(errors.into_iter().fold(first, MarshalError::join))
}

// ---------------------------------------------------------------------------
// Error context chaining
// ---------------------------------------------------------------------------

/// A builder for chaining human-readable context layers onto an error,
/// producing a `→`-joined display without losing the original [`ErrorKind`].
#[derive(Debug)]
pub struct ErrorChain {
    kind: ErrorKind,
    layers: Vec<String>,
}

impl ErrorChain {
    /// Start a chain from an existing [`MarshalError`], walking its `source`
    /// chain to seed the initial layers (outermost first).
    pub fn new(root: MarshalError) -> Self {
        let kind = root.kind();
        let mut layers = vec![root.message.clone()];
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            root.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static));
        while let Some(err) = current {
            layers.push(err.to_string());
            current = err.source();
        }
        Self { kind, layers }
    }

    /// Add an outer context layer.
    pub fn context(mut self, message: impl Into<String>) -> Self {
        self.layers.insert(0, message.into());
        self
    }

    /// Format the chain as a `" → "`-joined string, outermost first.
    pub fn display_chain(&self) -> String {
        self.layers.join(" \u{2192} ")
    }

    /// The kind carried by the original error this chain was built from.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_chain())
    }
}

impl MarshalError {
    /// Wrap this error with additional context, returning an [`ErrorChain`]
    /// for display purposes while leaving `self`'s kind recoverable via
    /// [`ErrorChain::kind`].
    pub fn with_context(self, message: impl Into<String>) -> ErrorChain {
        ErrorChain::new(self).context(message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_preserves_cancelled_under_unexpected() {
        let inner = MarshalError::new(ErrorKind::Cancelled, "scope done");
        let wrapped = inner.wrap(ErrorKind::Unexpected, "group execute failed");
        assert_eq!(wrapped.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn wrap_preserves_timeout_under_unexpected() {
        let inner = MarshalError::new(ErrorKind::Timeout, "deadline elapsed");
        let wrapped = inner.wrap(ErrorKind::Unexpected, "saga step failed");
        assert_eq!(wrapped.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn wrap_does_not_preserve_notfound_under_unexpected() {
        let inner = MarshalError::new(ErrorKind::NotFound, "missing key");
        let wrapped = inner.wrap(ErrorKind::Unexpected, "lookup failed");
        assert_eq!(wrapped.kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn wrap_with_explicit_non_unexpected_outer_always_wins() {
        let inner = MarshalError::new(ErrorKind::Cancelled, "scope done");
        let wrapped = inner.wrap(ErrorKind::Invalid, "bad config");
        assert_eq!(wrapped.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn join_all_empty_is_none() {
        assert!(join_all(Vec::new()).is_none());
    }

    #[test]
    fn join_all_preserves_first_kind() {
        let errs = vec![
            MarshalError::new(ErrorKind::Unexpected, "a"),
            MarshalError::new(ErrorKind::NotFound, "b"),
        ];
        let joined = join_all(errs).unwrap();
        assert_eq!(joined.kind(), ErrorKind::Unexpected);
        assert!(joined.to_string().contains('a'));
    }

    #[test]
    fn is_warning_and_is_failure_roundtrip() {
        let w = MarshalError::new(ErrorKind::Warning, "heads up");
        assert!(w.is_warning());
        assert!(!w.is_failure());

        let f = MarshalError::new(ErrorKind::Failed, "boom");
        assert!(f.is_failure());
        assert!(!f.is_warning());
    }

    #[test]
    fn error_chain_display_joins_with_arrow() {
        let root = MarshalError::new(ErrorKind::Unexpected, "tls handshake failed");
        let chain = root
            .with_context("network unreachable")
            .context("tool call failed");
        assert_eq!(
            chain.display_chain(),
            "tool call failed \u{2192} network unreachable \u{2192} tls handshake failed"
        );
    }

    #[test]
    fn error_chain_keeps_original_kind() {
        let root = MarshalError::new(ErrorKind::Cancelled, "scope done");
        let chain = root.with_context("group execute");
        assert_eq!(chain.kind(), ErrorKind::Cancelled);
    }
}
