//! Error types for the dap-mux system.
//!
//! # Error Taxonomy
//!
//! ```text
//! MuxError
//! ├── Protocol / UnknownPendingTarget      sequencing faults, never retried
//! ├── UnknownTarget / DuplicateTarget      target tree misuse
//! ├── SessionRejected                      a pending handle was torn down
//! ├── InvalidGlob                          regex construction failure
//! ├── Inspector / Connection               collaborator failures (best effort)
//! └── Config / Io / Toml / Json / Other    ambient
//! ```
//!
//! Mapping misses during range computation are not errors at all: they are
//! logged and the affected boundary is dropped.

use crate::id::TargetId;

/// Result type alias for dap-mux operations.
pub type Result<T> = std::result::Result<T, MuxError>;

/// Main error type for the dap-mux system.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The IDE or runtime violated the request ordering contract.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A terminal `launch`/`attach` carried a target tag nobody registered.
    #[error("No pending session for target {0}")]
    UnknownPendingTarget(TargetId),

    /// A target id was not present in the target tree.
    #[error("Unknown target: {0}")]
    UnknownTarget(TargetId),

    /// A target id was registered twice.
    #[error("Target already exists: {0}")]
    DuplicateTarget(TargetId),

    /// A pending session handle was rejected before it settled.
    #[error("Session for target {target} was rejected: {reason}")]
    SessionRejected { target: TargetId, reason: String },

    /// A glob could not be turned into a regular expression.
    #[error("Invalid glob {glob:?}: {reason}")]
    InvalidGlob { glob: String, reason: String },

    /// The remote-inspection collaborator failed or did not acknowledge.
    #[error("Inspector error: {0}")]
    Inspector(String),

    /// The IDE-side connection failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML decoding errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MuxError {
    /// Create a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a new inspector error
    pub fn inspector(msg: impl Into<String>) -> Self {
        Self::Inspector(msg.into())
    }

    /// Create a new connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new invalid glob error
    pub fn invalid_glob(glob: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidGlob {
            glob: glob.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new rejection error
    pub fn rejected(target: TargetId, reason: impl Into<String>) -> Self {
        Self::SessionRejected {
            target,
            reason: reason.into(),
        }
    }

    /// Whether the error signals a broken IDE/runtime contract.
    ///
    /// Fatal errors are surfaced at adapter-crash level rather than being
    /// reported back as a failed request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::UnknownPendingTarget(_))
    }
}
