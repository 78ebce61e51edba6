//! Foundation types for the dap-mux debug adapter core.
//!
//! This crate provides the error taxonomy, identifiers, configuration,
//! logging bootstrap, DAP argument types and collaborator traits shared by
//! the multiplexing and skip-policy components in `dap-mux`.

pub mod config;
pub mod error;
pub mod id;
pub mod logging;
pub mod protocol;
pub mod source;
pub mod traits;

pub use config::{LogConfig, MuxConfig, PathCase};
pub use error::{MuxError, Result};
pub use id::{BreakpointId, ConnectionId, ScriptId, SourceReference, TargetId};
pub use source::{AuthoredSource, Source};
pub use traits::{ConnectionHandle, DebugAdapter, IdeConnection, RemoteInspector, SourceGraph};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{MuxConfig, PathCase};
    pub use crate::error::{MuxError, Result};
    pub use crate::id::{ConnectionId, ScriptId, TargetId};
    pub use crate::protocol::Position;
    pub use crate::source::{AuthoredSource, Source};
    pub use crate::traits::*;
}
