//! The three-state lifecycle shared by vertices and transactions.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a vertex or transaction.
///
/// Monotone: `Processing` is the only non-terminal state, and the engine
/// only ever drives `Processing -> Accepted` or `Processing -> Rejected`.
/// Any other transition (including the reverse, or a terminal-to-terminal
/// move) is a programming error surfaced as
/// [`Error::InvalidStatusTransition`](crate::error::Error::InvalidStatusTransition).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Status {
    Processing,
    Accepted,
    Rejected,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: Status) -> bool {
        match (self, next) {
            (Status::Processing, Status::Accepted) => true,
            (Status::Processing, Status::Rejected) => true,
            (a, b) if *a == b => true,
            _ => false,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Processing
    }
}
