//! The seven error kinds of the engine's error-handling design, realized as a
//! single enum rather than raw sandbox errno codes. Handlers still return a
//! bare success/drop signal at the outer boundary (see [`crate::probe`]); this
//! type is for the internal helpers that would otherwise return negative
//! sandbox errno.

/// Errors a synopsis, window, or join operation can report.
///
/// Each variant documents the policy `spec.md` assigns to it; callers in
/// [`crate::probe`] apply that policy (warn-and-drop, abort-the-event,
/// return-at-attach) rather than propagating the error further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A join bucket, the join result ring, the output ring, or the
    /// next-step buffer is at capacity. Policy: warn, drop the offending
    /// record or result, continue.
    #[error("capacity exceeded")]
    BucketFull,

    /// A quantile, divisor, or composite key was malformed. Policy: return
    /// the error, log once per occurrence, continue.
    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),

    /// A histogram has no entries to quantile over. Policy: return the
    /// error, no emission for that query.
    #[error("no entries to compute a quantile over")]
    Empty,

    /// A delete was attempted on a key absent from the table. Policy: warn,
    /// treat as a no-op; suggests an upstream protocol bug.
    #[error("delete on absent key")]
    MissingEntry,

    /// An invariant was violated (head/tail out of range, a bucket count
    /// underflowed below zero). Policy: return a distinguished sentinel,
    /// abort the current event, do not mutate state further.
    #[error("invariant violated: {0}")]
    BugCheck(&'static str),

    /// The requested configuration falls outside the supported subset (a
    /// count window whose step does not divide its capacity, or a time
    /// window that is not tumbling). Policy: return the error at attach
    /// (construction) or on the first event.
    #[error("unsupported configuration: {0}")]
    Unimplemented(&'static str),

    /// The output ring buffer had no space for the batch. Policy: drop the
    /// whole batch, increment a counter.
    #[error("ring buffer reservation failed")]
    RingReserveFail,

    /// A host helper (clock, pid/tgid, comm, cpu id, cgroup id, namespace
    /// pid) returned a failure. Policy: log, continue with a default value.
    #[error("host helper failed: {0}")]
    HostHelperFail(&'static str),
}
