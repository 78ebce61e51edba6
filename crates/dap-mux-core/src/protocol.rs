//! DAP argument types the multiplexer inspects, buffers or produces.
//!
//! Only the fields the session layer reads are typed. Everything else rides
//! along in a flattened `other` map so replay is lossless.

use crate::id::{BreakpointId, SourceReference, TargetId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the private configuration field that tags a nested session with
/// the target it was requested for.
pub const PENDING_TARGET_ID_FIELD: &str = "__pendingTargetId";

/// Zero-based location in a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub line_number: u32,
    pub column_number: u32,
}

impl Position {
    pub fn new(line_number: u32, column_number: u32) -> Self {
        Self {
            line_number,
            column_number,
        }
    }
}

/// `initialize` request arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_start_at1: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns_start_at1: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_start_debugging_request: Option<bool>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// DAP `Source` as sent by the IDE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DapSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<SourceReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

/// `setBreakpoints` request arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: DapSource,
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_modified: Option<bool>,
}

/// Breakpoint as reported back to the IDE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<BreakpointId>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<DapSource>,
}

impl Breakpoint {
    /// Placeholder reply for a breakpoint set before any target exists.
    pub fn unverified(id: BreakpointId, line: i64, source: DapSource) -> Self {
        Self {
            id: Some(id),
            verified: false,
            message: None,
            line: Some(line),
            source: Some(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionFilterOptions {
    pub filter_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// `setExceptionBreakpoints` request arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExceptionBreakpointsArguments {
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_options: Option<Vec<ExceptionFilterOptions>>,
}

/// Custom (event listener, instrumentation) breakpoints toggled by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableCustomBreakpointsArguments {
    pub ids: Vec<String>,
}

/// Arguments of the terminal `launch`/`attach` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchArguments {
    #[serde(rename = "__pendingTargetId", skip_serializing_if = "Option::is_none")]
    pub pending_target_id: Option<TargetId>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Requests a nested session's connection sends before it is matched.
///
/// Parsed from the `{ "command": ..., "arguments": ... }` shape of a DAP
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "arguments", rename_all = "camelCase")]
pub enum InboundRequest {
    Initialize(InitializeArguments),
    SetExceptionBreakpoints(SetExceptionBreakpointsArguments),
    SetBreakpoints(SetBreakpointsArguments),
    EnableCustomBreakpoints(EnableCustomBreakpointsArguments),
    ConfigurationDone,
    Launch(LaunchArguments),
    Attach(LaunchArguments),
}

impl InboundRequest {
    pub fn command(&self) -> &'static str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::SetExceptionBreakpoints(_) => "setExceptionBreakpoints",
            Self::SetBreakpoints(_) => "setBreakpoints",
            Self::EnableCustomBreakpoints(_) => "enableCustomBreakpoints",
            Self::ConfigurationDone => "configurationDone",
            Self::Launch(_) => "launch",
            Self::Attach(_) => "attach",
        }
    }

    /// `launch` and `attach` end the pre-launch phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Launch(_) | Self::Attach(_))
    }
}

/// `request` field of a `startDebugging` reverse request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchKind {
    Launch,
    Attach,
}

/// Configuration of a nested debug session requested for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedSessionConfig {
    #[serde(rename = "type")]
    pub debug_type: String,
    pub name: String,
    #[serde(rename = "__pendingTargetId")]
    pub pending_target_id: TargetId,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// `startDebugging` reverse request arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartDebuggingArguments {
    pub request: LaunchKind,
    pub configuration: NestedSessionConfig,
}

/// Parameters of the "toggle skipping this file" command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToggleSkipFileParams {
    /// A URL or absolute path.
    #[serde(rename_all = "camelCase")]
    Resource { resource: String },
    /// A DAP source reference.
    #[serde(rename_all = "camelCase")]
    Reference { source_reference: SourceReference },
}

/// Result of a toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ToggleSkipFileOutcome {
    Toggled { url: String, skipped: bool },
    NotFound,
}
