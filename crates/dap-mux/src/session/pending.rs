//! Inbound connections that have not yet said which target they are for.

use dap_mux_core::error::{MuxError, Result};
use dap_mux_core::id::{BreakpointId, ConnectionId};
use dap_mux_core::protocol::{
    Breakpoint, InboundRequest, InitializeArguments, LaunchArguments, LaunchKind,
    SetBreakpointsArguments, SetExceptionBreakpointsArguments,
};
use dap_mux_core::traits::ConnectionHandle;
use tracing::{debug, trace};

/// Pre-launch traffic of one connection, kept for replay.
#[derive(Debug, Clone, Default)]
pub struct HandshakeBuffer {
    pub initialize: Option<InitializeArguments>,
    pub exception_breakpoints: Option<SetExceptionBreakpointsArguments>,
    /// Every `setBreakpoints` call with the placeholder ids it was answered with.
    pub breakpoints: Vec<(SetBreakpointsArguments, Vec<BreakpointId>)>,
    pub custom_breakpoints: Option<Vec<String>>,
    pub configuration_done: bool,
}

/// What to do with a request after [`PendingConnection::collect`].
#[derive(Debug, Clone, PartialEq)]
pub enum Collected {
    /// Buffered; reply with an empty success.
    Ack,
    /// Buffered; reply with these placeholder breakpoints.
    Breakpoints(Vec<Breakpoint>),
    /// The terminal request. Hand the connection to the session registry.
    Terminal {
        kind: LaunchKind,
        args: LaunchArguments,
    },
}

/// An inbound connection in the collecting phase.
pub struct PendingConnection {
    connection: ConnectionHandle,
    buffer: HandshakeBuffer,
    next_breakpoint_id: BreakpointId,
}

impl std::fmt::Debug for PendingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingConnection")
            .field("connection", &self.connection.id())
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl PendingConnection {
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            connection,
            buffer: HandshakeBuffer::default(),
            next_breakpoint_id: 1,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn buffer(&self) -> &HandshakeBuffer {
        &self.buffer
    }

    /// Buffer one request.
    ///
    /// A terminal request before `initialize` is a protocol error.
    pub fn collect(&mut self, request: InboundRequest) -> Result<Collected> {
        trace!(connection = %self.connection.id(), command = request.command(), "Collecting request");

        match request {
            InboundRequest::Initialize(args) => {
                self.buffer.initialize = Some(args);
                Ok(Collected::Ack)
            }
            InboundRequest::SetExceptionBreakpoints(args) => {
                self.buffer.exception_breakpoints = Some(args);
                Ok(Collected::Ack)
            }
            InboundRequest::SetBreakpoints(args) => {
                let ids: Vec<BreakpointId> = args
                    .breakpoints
                    .iter()
                    .map(|_| self.allocate_breakpoint_id())
                    .collect();
                let reply = args
                    .breakpoints
                    .iter()
                    .zip(&ids)
                    .map(|(bp, id)| Breakpoint::unverified(*id, bp.line, args.source.clone()))
                    .collect();
                self.buffer.breakpoints.push((args, ids));
                Ok(Collected::Breakpoints(reply))
            }
            InboundRequest::EnableCustomBreakpoints(args) => {
                self.buffer.custom_breakpoints = Some(args.ids);
                Ok(Collected::Ack)
            }
            InboundRequest::ConfigurationDone => {
                self.buffer.configuration_done = true;
                Ok(Collected::Ack)
            }
            InboundRequest::Launch(args) => self.terminal(LaunchKind::Launch, args),
            InboundRequest::Attach(args) => self.terminal(LaunchKind::Attach, args),
        }
    }

    fn terminal(&self, kind: LaunchKind, args: LaunchArguments) -> Result<Collected> {
        if self.buffer.initialize.is_none() {
            return Err(MuxError::protocol(format!(
                "{:?} received before initialize on connection {}",
                kind,
                self.connection.id()
            )));
        }
        debug!(connection = %self.connection.id(), ?kind, target_id = ?args.pending_target_id, "Terminal request received");
        Ok(Collected::Terminal { kind, args })
    }

    fn allocate_breakpoint_id(&mut self) -> BreakpointId {
        let id = self.next_breakpoint_id;
        self.next_breakpoint_id += 1;
        id
    }

    pub fn into_parts(self) -> (ConnectionHandle, HandshakeBuffer) {
        (self.connection, self.buffer)
    }
}
