//! Error types for the lock scheduling core.

use thiserror::Error;

/// Errors the multi-locker can report back to a caller.
///
/// The multi-locker itself is infallible except for the draining case —
/// conflict resolution, queueing, and release never fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockerError {
    /// The namespace is draining (shutting down) and rejects new submits.
    #[error("namespace is draining")]
    Draining,
}

/// Errors surfaced by the per-connection protocol state machine.
///
/// Every variant here is terminal: the session ends after it is reported.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Malformed JSON on the wire.
    #[error("invalid request: {0}")]
    MalformedRequest(String),

    /// `action` was neither `"lock"` nor `"release"`.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// A resource's `type` field was not one of `r`/`read`/`w`/`write`.
    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    /// A `lock` request carried an empty `resources` list.
    #[error("lock request must name at least one resource")]
    EmptyClaims,

    /// The action is not permitted from the session's current state
    /// (e.g. `lock` while already `acquired`, `release` while `ready`).
    #[error("action {action} is not permitted in state {state}")]
    Misuse {
        /// The action the client attempted (`"lock"` or `"release"`).
        action: &'static str,
        /// The session state it attempted it from.
        state: &'static str,
    },

    /// The namespace is draining; the lock request was rejected.
    #[error("namespace is draining")]
    Draining,
}

impl From<LockerError> for ProtocolError {
    fn from(e: LockerError) -> Self {
        match e {
            LockerError::Draining => ProtocolError::Draining,
        }
    }
}
