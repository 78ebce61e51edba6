//! Multi-target debug adapter core.
//!
//! A single debugging run can span many runtime targets: a page and its
//! workers, a Node process and its children. This crate keeps one nested
//! IDE session per target and one skip policy per target:
//!
//! - [`target`]: the tree of discovered targets
//! - [`session`]: acquiring, matching and releasing nested IDE sessions
//! - [`skip`]: skip-file globs, blackboxed ranges and cross-session sync
//! - [`glob`]: glob to regex compilation used by the skip policy
//!
//! Collaborators (the runtime inspector, the source-map graph, the IDE
//! connection and the per-target adapter) are traits in `dap-mux-core`;
//! [`testing`] has in-memory implementations.

pub mod glob;
pub mod session;
pub mod skip;
pub mod target;
pub mod testing;

pub use dap_mux_core::{MuxConfig, MuxError, Result};
pub use session::{PendingConnection, SessionRegistry};
pub use skip::{SkipPolicy, SkipPropagator, SkipSyncBus};
pub use target::{Target, TargetKind, TargetTree};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::session::{Collected, PendingConnection, SessionRegistry, SessionState};
    pub use crate::skip::{SkipPolicy, SkipPropagator, SkipSyncBus};
    pub use crate::target::{Target, TargetKind, TargetTree};
    pub use dap_mux_core::prelude::*;
}
