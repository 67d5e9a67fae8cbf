//! Hierarchical multi-lock scheduling core.
//!
//! ```text
//! session handler --submit--> multi-locker --wait--> readiness signal
//!       ^                         |
//!       |                         v
//!       +-------- release -- path store (conflict probing)
//! ```
//!
//! [`registry::NamespaceRegistry`] maps namespace names to independent
//! [`locker::MultiLocker`] instances, each owning its own
//! [`path::PathStore`]. [`session::run_session`] drives one connection's
//! protocol state machine against a namespace's multi-locker, transport-
//! agnostically via [`session::SessionTransport`].

pub mod error;
pub mod locker;
pub mod path;
pub mod protocol;
pub mod registry;
pub mod session;

pub use error::{LockerError, ProtocolError};
pub use locker::{BatchHandle, BatchId, MultiLocker, Statistics};
pub use protocol::{Claim, Mode, WireRequest, WireResponse, WireState};
pub use registry::NamespaceRegistry;
pub use session::{run_session, SessionTransport, CLOSE_CODE_INVALID_INPUT};
