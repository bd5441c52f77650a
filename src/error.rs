//! The engine's error taxonomy.
//!
//! One enum, grounded in the shape of `zfx_subzero::Error` (a flat,
//! hand-rolled enum covering every failure kind a component can raise) but
//! expressed with `thiserror` instead of a manual `Display` impl, since
//! this is new non-trivial error-enum code and `thiserror` is the crate
//! the rest of this pack (e.g. `chronx-core`, `daa-sdk`) reaches for here.

use crate::id::Id;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A vertex referenced an unregistered vertex ID (as a parent, or via
    /// a direct lookup).
    #[error("unknown vertex: {0}")]
    UnknownVertex(Id),

    /// Inserting a vertex would have created a cycle, or the DAG's
    /// height invariant would be violated.
    #[error("dag invariant violated: {0}")]
    DagInvariantViolated(String),

    /// A status transition other than Processing -> {Accepted, Rejected}
    /// was attempted.
    #[error("invalid status transition for {0}: {1:?} -> {2:?}")]
    InvalidStatusTransition(Id, crate::status::Status, crate::status::Status),

    /// A vertex or transaction verifier reported invalid data.
    #[error("verification failed for {0}: {1}")]
    VerificationFailed(Id, String),

    /// The driving cancellation token fired before the operation finished.
    #[error("operation cancelled")]
    Cancelled,

    /// The worker pool received a task but has no registered workers.
    #[error("no workers registered")]
    NoWorkers,

    /// The worker pool's task queue is at capacity.
    #[error("task queue is full")]
    QueueFull,

    /// A task was submitted after the pool was stopped.
    #[error("worker pool is stopped")]
    PoolStopped,

    /// A spawned verification or worker task panicked or was aborted.
    #[error("worker task panicked: {0}")]
    WorkerPanicked(String),

    /// An `Id` could not be parsed from its base58check string form.
    #[error("invalid id encoding")]
    InvalidIdEncoding,
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::WorkerPanicked(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
