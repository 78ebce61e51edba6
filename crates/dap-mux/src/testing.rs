//! In-memory collaborators for testing.
//!
//! These stand in for the runtime, the source-map graph, the IDE and the
//! per-target adapter. Each records the calls it receives so tests can
//! inspect them afterwards.
//!
//! # Examples
//!
//! ```rust
//! use dap_mux::testing::MockInspector;
//! use dap_mux_core::traits::RemoteInspector;
//!
//! #[tokio::main]
//! async fn main() {
//!     let inspector = MockInspector::new();
//!     inspector.set_blackbox_patterns(vec!["^foo".to_string()]).await.unwrap();
//!     assert_eq!(inspector.pattern_calls(), vec![vec!["^foo".to_string()]]);
//! }
//! ```

use async_trait::async_trait;
use dap_mux_core::error::{MuxError, Result};
use dap_mux_core::id::{BreakpointId, ConnectionId, ScriptId, SourceReference};
use dap_mux_core::protocol::{
    Breakpoint, InitializeArguments, Position, SetBreakpointsArguments,
    SetExceptionBreakpointsArguments, StartDebuggingArguments,
};
use dap_mux_core::source::{AuthoredSource, Source};
use dap_mux_core::traits::{DebugAdapter, IdeConnection, RemoteInspector, SourceGraph};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct InspectorState {
    patterns: Vec<Vec<String>>,
    ranges: Vec<(ScriptId, Vec<Position>)>,
    evaluations: Vec<String>,
    evaluate_result: Option<std::result::Result<Value, String>>,
    fail_pushes: bool,
}

/// Remote inspector that records blackbox calls.
///
/// `evaluate` answers with the configured result, or an error if none is set.
#[derive(Debug, Default)]
pub struct MockInspector {
    state: Mutex<InspectorState>,
}

impl MockInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_evaluate_result(&self, result: std::result::Result<Value, String>) {
        self.state.lock().evaluate_result = Some(result);
    }

    /// Make every blackbox push fail after recording it.
    pub fn fail_pushes(&self, fail: bool) {
        self.state.lock().fail_pushes = fail;
    }

    pub fn pattern_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().patterns.clone()
    }

    pub fn range_calls(&self) -> Vec<(ScriptId, Vec<Position>)> {
        self.state.lock().ranges.clone()
    }

    pub fn evaluations(&self) -> Vec<String> {
        self.state.lock().evaluations.clone()
    }
}

#[async_trait]
impl RemoteInspector for MockInspector {
    async fn set_blackbox_patterns(&self, patterns: Vec<String>) -> Result<()> {
        let mut state = self.state.lock();
        state.patterns.push(patterns);
        if state.fail_pushes {
            return Err(MuxError::inspector("no acknowledgment"));
        }
        Ok(())
    }

    async fn set_blackboxed_ranges(&self, script: &ScriptId, positions: Vec<Position>) -> Result<()> {
        let mut state = self.state.lock();
        state.ranges.push((script.clone(), positions));
        if state.fail_pushes {
            return Err(MuxError::inspector("no acknowledgment"));
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let mut state = self.state.lock();
        state.evaluations.push(expression.to_string());
        match &state.evaluate_result {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(MuxError::inspector(message.clone())),
            None => Err(MuxError::inspector("evaluation not supported")),
        }
    }
}

#[derive(Debug, Default)]
struct GraphState {
    sources: HashMap<SourceReference, Source>,
    authored: HashMap<SourceReference, Vec<AuthoredSource>>,
    compiled: HashMap<SourceReference, Vec<Source>>,
    scripts: HashMap<SourceReference, Vec<ScriptId>>,
    /// (authored, compiled, authored position) -> compiled position
    mappings: HashMap<(SourceReference, SourceReference, Position), Position>,
}

/// Source graph built up by hand.
#[derive(Debug, Default)]
pub struct MockSourceGraph {
    state: Mutex<GraphState>,
}

impl MockSourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, source: &Source) {
        self.state
            .lock()
            .sources
            .insert(source.source_reference, source.clone());
    }

    /// Register `authored` under `compiled` without any position mapping.
    pub fn add_authored(&self, compiled: &Source, authored: AuthoredSource) {
        let mut state = self.state.lock();
        state.sources.insert(compiled.source_reference, compiled.clone());
        state
            .sources
            .insert(authored.source.source_reference, authored.source.clone());
        state
            .compiled
            .entry(authored.source.source_reference)
            .or_default()
            .push(compiled.clone());
        state
            .authored
            .entry(compiled.source_reference)
            .or_default()
            .push(authored);
    }

    /// Register authored sources of `compiled` in order, each with the
    /// compiled positions its start and end map to.
    pub fn add_bundle(&self, compiled: &Source, authored: Vec<(AuthoredSource, Position, Position)>) {
        for (source, start, end) in authored {
            {
                let mut state = self.state.lock();
                let key = (source.source.source_reference, compiled.source_reference);
                state.mappings.insert((key.0, key.1, source.start()), start);
                state.mappings.insert((key.0, key.1, source.end), end);
            }
            self.add_authored(compiled, source);
        }
    }

    pub fn add_script(&self, source: &Source, script: ScriptId) {
        let mut state = self.state.lock();
        state.sources.insert(source.source_reference, source.clone());
        state
            .scripts
            .entry(source.source_reference)
            .or_default()
            .push(script);
    }
}

impl SourceGraph for MockSourceGraph {
    fn source_by_reference(&self, reference: SourceReference) -> Option<Source> {
        self.state.lock().sources.get(&reference).cloned()
    }

    fn source_by_url(&self, url: &str) -> Option<Source> {
        self.state
            .lock()
            .sources
            .values()
            .find(|source| source.url == url)
            .cloned()
    }

    fn authored_sources_of(&self, compiled: &Source) -> Vec<AuthoredSource> {
        self.state
            .lock()
            .authored
            .get(&compiled.source_reference)
            .cloned()
            .unwrap_or_default()
    }

    fn compiled_sources_of(&self, authored: &Source) -> Vec<Source> {
        self.state
            .lock()
            .compiled
            .get(&authored.source_reference)
            .cloned()
            .unwrap_or_default()
    }

    fn scripts_of(&self, source: &Source) -> Vec<ScriptId> {
        self.state
            .lock()
            .scripts
            .get(&source.source_reference)
            .cloned()
            .unwrap_or_default()
    }

    fn map_to_compiled_location(&self, authored: &Source, compiled: &Source, position: Position) -> Option<Position> {
        self.state
            .lock()
            .mappings
            .get(&(authored.source_reference, compiled.source_reference, position))
            .copied()
    }
}

/// IDE connection that records nested-session requests.
#[derive(Debug)]
pub struct MockIdeConnection {
    id: ConnectionId,
    requests: Mutex<Vec<StartDebuggingArguments>>,
    fail: Mutex<bool>,
}

impl Default for MockIdeConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdeConnection {
    pub fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            requests: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
        }
    }

    pub fn start_requests(&self) -> Vec<StartDebuggingArguments> {
        self.requests.lock().clone()
    }

    /// Make `start_nested_session` fail.
    pub fn fail_requests(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

#[async_trait]
impl IdeConnection for MockIdeConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn start_nested_session(&self, args: StartDebuggingArguments) -> Result<()> {
        if *self.fail.lock() {
            return Err(MuxError::connection("connection closed"));
        }
        self.requests.lock().push(args);
        Ok(())
    }
}

/// One call received by a [`RecordingAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterCall {
    SetExceptionBreakpoints(SetExceptionBreakpointsArguments),
    SetBreakpoints(SetBreakpointsArguments, Vec<BreakpointId>),
    EnableCustomBreakpoints(Vec<String>),
    ConfigurationDone,
    Initialize(InitializeArguments),
    LaunchBlocker,
}

/// Debug adapter that records the replayed handshake.
#[derive(Debug, Default)]
pub struct RecordingAdapter {
    calls: Mutex<Vec<AdapterCall>>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: AdapterCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl DebugAdapter for RecordingAdapter {
    async fn set_exception_breakpoints(&self, args: SetExceptionBreakpointsArguments) -> Result<()> {
        self.record(AdapterCall::SetExceptionBreakpoints(args));
        Ok(())
    }

    async fn set_breakpoints(&self, args: SetBreakpointsArguments, ids: Vec<BreakpointId>) -> Result<Vec<Breakpoint>> {
        let breakpoints = args
            .breakpoints
            .iter()
            .zip(&ids)
            .map(|(bp, id)| Breakpoint {
                id: Some(*id),
                verified: true,
                line: Some(bp.line),
                ..Default::default()
            })
            .collect();
        self.record(AdapterCall::SetBreakpoints(args, ids));
        Ok(breakpoints)
    }

    async fn enable_custom_breakpoints(&self, ids: Vec<String>) -> Result<()> {
        self.record(AdapterCall::EnableCustomBreakpoints(ids));
        Ok(())
    }

    async fn configuration_done(&self) -> Result<()> {
        self.record(AdapterCall::ConfigurationDone);
        Ok(())
    }

    async fn initialize(&self, args: InitializeArguments) -> Result<()> {
        self.record(AdapterCall::Initialize(args));
        Ok(())
    }

    async fn launch_blocker(&self) -> Result<()> {
        self.record(AdapterCall::LaunchBlocker);
        Ok(())
    }
}
