//! Matching nested IDE sessions to the targets they were requested for.
//!
//! The handshake for one target:
//!
//! ```text
//! acquire_session(target)
//!   ├─ insert pending record               (PendingAcquire)
//!   ├─ await parent's connection
//!   ├─ startDebugging over that connection, tagged with the target id
//!   │        ... IDE opens a connection, sends pre-launch traffic ...
//!   │        complete_handshake(conn, launch/attach)      (Matched)
//!   └─ connection resolved
//! init_adapter(adapter, target)
//!   ├─ replay buffered traffic in order
//!   ├─ await adapter launch blocker                        (Initialized)
//!   └─ release the launch/attach response
//! release_session(target)                                  (record removed)
//! ```

use super::deferred::{Deferred, Waiter};
use super::pending::{HandshakeBuffer, PendingConnection};
use crate::target::Target;
use chrono::{DateTime, Utc};
use dap_mux_core::config::MuxConfig;
use dap_mux_core::error::{MuxError, Result};
use dap_mux_core::id::TargetId;
use dap_mux_core::protocol::{LaunchArguments, LaunchKind, NestedSessionConfig, StartDebuggingArguments};
use dap_mux_core::traits::{ConnectionHandle, DebugAdapter};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a target's session is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Nested session requested, no connection matched yet.
    PendingAcquire,
    /// Connection matched, pre-launch traffic not yet replayed.
    Matched,
    /// Adapter initialized, launch response released.
    Initialized,
}

/// Snapshot of one session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSessionInfo {
    pub target_id: TargetId,
    pub name: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

struct PendingSession {
    target: Arc<Target>,
    state: SessionState,
    connection: Deferred<ConnectionHandle>,
    handshake: Option<HandshakeBuffer>,
    launch_gate: Deferred<()>,
    created_at: DateTime<Utc>,
}

impl PendingSession {
    fn new(target: Arc<Target>) -> Self {
        Self {
            target,
            state: SessionState::PendingAcquire,
            connection: Deferred::new(),
            handshake: None,
            launch_gate: Deferred::new(),
            created_at: Utc::now(),
        }
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        let rejected = self.connection.reject("session released");
        self.launch_gate.reject("session released");
        if rejected {
            debug!(target_id = %self.target.id(), "Rejected unresolved session on release");
        }
    }
}

/// Registry of nested sessions, keyed by target id.
pub struct SessionRegistry {
    root_connection: ConnectionHandle,
    debug_type: String,
    sessions: DashMap<TargetId, PendingSession>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("root_connection", &self.root_connection.id())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Create a registry whose root targets nest under `root_connection`.
    pub fn new(root_connection: ConnectionHandle, config: &MuxConfig) -> Self {
        Self {
            root_connection,
            debug_type: config.debug_type.clone(),
            sessions: DashMap::new(),
        }
    }

    /// Request a nested IDE session for `target` and wait for it to connect.
    ///
    /// The request goes over the connection of the nearest ancestor that has
    /// a session, so it is never issued before that ancestor is matched.
    pub async fn acquire_session(&self, target: &Arc<Target>) -> Result<ConnectionHandle> {
        let id = target.id().clone();
        let waiter = match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => return Err(MuxError::DuplicateTarget(id)),
            Entry::Vacant(slot) => {
                let session = PendingSession::new(target.clone());
                let waiter = session.connection.waiter();
                slot.insert(session);
                waiter
            }
        };
        debug!(target_id = %id, "Pending session registered");

        let parent_connection = match self.parent_connection(target).await {
            Ok(connection) => connection,
            Err(e) => {
                self.release_session(&id);
                return Err(e);
            }
        };

        let args = StartDebuggingArguments {
            request: LaunchKind::Attach,
            configuration: NestedSessionConfig {
                debug_type: self.debug_type.clone(),
                name: target.name().to_string(),
                pending_target_id: id.clone(),
                other: Default::default(),
            },
        };

        if let Err(e) = parent_connection.start_nested_session(args).await {
            warn!(target_id = %id, error = %e, "Failed to request nested session");
            self.release_session(&id);
            return Err(e);
        }

        let connection = waiter.wait().await.map_err(|reason| MuxError::rejected(id.clone(), reason))?;
        info!(target_id = %id, connection = %connection.id(), "Session acquired");
        Ok(connection)
    }

    async fn parent_connection(&self, target: &Arc<Target>) -> Result<ConnectionHandle> {
        let mut ancestor = target.parent();
        while let Some(current) = ancestor {
            if let Some(waiter) = self.connection_waiter(current.id()) {
                debug!(target_id = %target.id(), parent = %current.id(), "Waiting for parent session");
                return waiter
                    .wait()
                    .await
                    .map_err(|reason| MuxError::rejected(current.id().clone(), reason));
            }
            ancestor = current.parent();
        }
        Ok(self.root_connection.clone())
    }

    fn connection_waiter(&self, id: &TargetId) -> Option<Waiter<ConnectionHandle>> {
        self.sessions.get(id).map(|session| session.connection.waiter())
    }

    /// Wait for the connection of an already acquired target.
    pub async fn connection(&self, id: &TargetId) -> Result<ConnectionHandle> {
        let waiter = self
            .connection_waiter(id)
            .ok_or_else(|| MuxError::UnknownPendingTarget(id.clone()))?;
        waiter
            .wait()
            .await
            .map_err(|reason| MuxError::rejected(id.clone(), reason))
    }

    /// Match a collecting connection to its target by the terminal request tag.
    ///
    /// Resolves the target's connection, then waits until [`init_adapter`]
    /// has finished so the caller can answer `launch`/`attach`. An untagged
    /// or unknown tag is a fatal protocol error.
    ///
    /// [`init_adapter`]: SessionRegistry::init_adapter
    pub async fn complete_handshake(&self, pending: PendingConnection, args: LaunchArguments) -> Result<()> {
        let Some(id) = args.pending_target_id else {
            return Err(MuxError::protocol(format!(
                "terminal request on connection {} carries no target tag",
                pending.id()
            )));
        };
        if pending.buffer().initialize.is_none() {
            return Err(MuxError::protocol(format!(
                "launch received before initialize for target {}",
                id
            )));
        }

        let (connection, buffer) = pending.into_parts();
        let gate = {
            let mut session = self
                .sessions
                .get_mut(&id)
                .ok_or_else(|| MuxError::UnknownPendingTarget(id.clone()))?;
            if session.state != SessionState::PendingAcquire {
                return Err(MuxError::protocol(format!(
                    "target {} already has a connection ({:?})",
                    id, session.state
                )));
            }
            session.handshake = Some(buffer);
            session.state = SessionState::Matched;
            session.connection.resolve(connection);
            session.launch_gate.waiter()
        };
        debug!(target_id = %id, "Connection matched to pending session");

        gate.wait().await.map_err(|reason| MuxError::rejected(id, reason))
    }

    /// Replay the buffered handshake of `target` into `adapter`.
    ///
    /// Order: exception filters, breakpoints (with their placeholder ids),
    /// custom breakpoints, `configurationDone`, `initialize`, then the
    /// adapter's launch blocker. Returns false if the target has no matched
    /// handshake to replay.
    pub async fn init_adapter(&self, adapter: &dyn DebugAdapter, target: &Target) -> Result<bool> {
        let id = target.id();
        let buffer = match self.sessions.get_mut(id) {
            Some(mut session) => session.handshake.take(),
            None => None,
        };
        let Some(buffer) = buffer else {
            debug!(target_id = %id, "No handshake to replay");
            return Ok(false);
        };

        if let Err(e) = replay(adapter, buffer).await {
            warn!(target_id = %id, error = %e, "Adapter initialization failed");
            if let Some(session) = self.sessions.get(id) {
                session.launch_gate.reject(e.to_string());
            }
            return Err(e);
        }

        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.state = SessionState::Initialized;
                session.launch_gate.resolve(());
                info!(target_id = %id, "Adapter initialized");
                Ok(true)
            }
            None => {
                debug!(target_id = %id, "Session released during initialization");
                Ok(false)
            }
        }
    }

    /// Drop the record of `id`, rejecting anything still waiting on it.
    pub fn release_session(&self, id: &TargetId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(target_id = %id, "Session released");
        }
        removed
    }

    /// Release `target` and every descendant, children first.
    pub fn release_subtree(&self, target: &Target) -> usize {
        let mut released = 0;
        for child in target.children() {
            released += self.release_subtree(&child);
        }
        if self.release_session(target.id()) {
            released += 1;
        }
        released
    }

    pub fn state(&self, id: &TargetId) -> Option<SessionState> {
        self.sessions.get(id).map(|session| session.state)
    }

    /// Snapshot of all records, oldest first.
    pub fn pending_sessions(&self) -> Vec<PendingSessionInfo> {
        let mut sessions: Vec<PendingSessionInfo> = self
            .sessions
            .iter()
            .map(|entry| PendingSessionInfo {
                target_id: entry.key().clone(),
                name: entry.target.name().to_string(),
                state: entry.state,
                created_at: entry.created_at,
            })
            .collect();
        sessions.sort_by_key(|info| info.created_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

async fn replay(adapter: &dyn DebugAdapter, buffer: HandshakeBuffer) -> Result<()> {
    if let Some(filters) = buffer.exception_breakpoints {
        adapter.set_exception_breakpoints(filters).await?;
    }
    for (args, ids) in buffer.breakpoints {
        adapter.set_breakpoints(args, ids).await?;
    }
    if let Some(ids) = buffer.custom_breakpoints {
        adapter.enable_custom_breakpoints(ids).await?;
    }
    adapter.configuration_done().await?;
    if let Some(initialize) = buffer.initialize {
        adapter.initialize(initialize).await?;
    }
    adapter.launch_blocker().await
}
