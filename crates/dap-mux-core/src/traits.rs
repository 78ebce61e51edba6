//! Collaborator traits.
//!
//! The multiplexer never speaks a wire protocol itself. Everything it needs
//! from the runtime, the source-map graph and the IDE goes through these
//! seams, which the embedding adapter implements.

use crate::error::Result;
use crate::id::{BreakpointId, ConnectionId, ScriptId, SourceReference};
use crate::protocol::{
    Breakpoint, InitializeArguments, Position, SetBreakpointsArguments,
    SetExceptionBreakpointsArguments, StartDebuggingArguments,
};
use crate::source::{AuthoredSource, Source};
use async_trait::async_trait;
use std::sync::Arc;

/// The remote-inspection side of one target.
#[async_trait]
pub trait RemoteInspector: Send + Sync {
    /// Replace the target-wide list of blackboxed URL regexes.
    async fn set_blackbox_patterns(&self, patterns: Vec<String>) -> Result<()>;

    /// Replace the blackboxed ranges of one script.
    ///
    /// `positions` alternate start/end and are zero-based.
    async fn set_blackboxed_ranges(&self, script: &ScriptId, positions: Vec<Position>) -> Result<()>;

    /// Evaluate an expression in the target and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;
}

/// Lookup over loaded sources and their source maps.
///
/// Implementations are in-memory indexes; calls never suspend.
pub trait SourceGraph: Send + Sync {
    fn source_by_reference(&self, reference: SourceReference) -> Option<Source>;

    fn source_by_url(&self, url: &str) -> Option<Source>;

    /// Authored sources of `compiled`, in source-map declaration order.
    fn authored_sources_of(&self, compiled: &Source) -> Vec<AuthoredSource>;

    /// Compiled sources whose source maps reference `authored`.
    fn compiled_sources_of(&self, authored: &Source) -> Vec<Source>;

    /// Runtime scripts backing `source`.
    fn scripts_of(&self, source: &Source) -> Vec<ScriptId>;

    /// Map a position in `authored` to the generated position in `compiled`.
    fn map_to_compiled_location(
        &self,
        authored: &Source,
        compiled: &Source,
        position: Position,
    ) -> Option<Position>;
}

/// One DAP connection to the IDE.
#[async_trait]
pub trait IdeConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Ask the IDE to open a nested session. The answer arrives as a new
    /// inbound connection, not as a response.
    async fn start_nested_session(&self, args: StartDebuggingArguments) -> Result<()>;
}

/// Shared handle to an IDE connection.
pub type ConnectionHandle = Arc<dyn IdeConnection>;

/// The per-target adapter a matched session is handed to.
#[async_trait]
pub trait DebugAdapter: Send + Sync {
    async fn set_exception_breakpoints(&self, args: SetExceptionBreakpointsArguments) -> Result<()>;

    /// Apply breakpoints, keeping the ids the IDE already knows them by.
    async fn set_breakpoints(
        &self,
        args: SetBreakpointsArguments,
        ids: Vec<BreakpointId>,
    ) -> Result<Vec<Breakpoint>>;

    async fn enable_custom_breakpoints(&self, ids: Vec<String>) -> Result<()>;

    async fn configuration_done(&self) -> Result<()>;

    async fn initialize(&self, args: InitializeArguments) -> Result<()>;

    /// Resolves once the target may be resumed.
    async fn launch_blocker(&self) -> Result<()>;
}
