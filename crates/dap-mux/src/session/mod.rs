//! Nested-session multiplexing.
//!
//! One IDE connection per target, matched to its target by a private tag
//! carried on the terminal `launch`/`attach` request.

pub mod deferred;
pub mod pending;
pub mod registry;

pub use deferred::{Deferred, Settlement, Waiter};
pub use pending::{Collected, HandshakeBuffer, PendingConnection};
pub use registry::{PendingSessionInfo, SessionRegistry, SessionState};
